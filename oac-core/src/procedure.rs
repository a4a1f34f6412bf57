//! The procedure (§4.1): the top-level container of a parsed operational
//! instruction — a workspace, a forest of named top-level instruction
//! trees, a designated root, and the preamble metadata a parser attaches
//! (plugin names, descriptive attributes).

use triomphe::Arc as StdArc;

use anyhow::Result;
use arcstr::ArcStr;
use fxhash::FxHashMap;
use parking_lot::Mutex;

use crate::attr::AttrBag;
use crate::error::CoreError;
use crate::instruction::{Node, ProcedureLoader, SetupCtx, TreeRef, UnavailableLoader};
use crate::ui::UserInterface;
use crate::workspace::Workspace;

/// A fully parsed procedure, ready for `Setup` (§4.1). A parser (out of
/// scope for this crate) is responsible for turning markup into the
/// `Workspace` and `Node` trees this struct wraps.
pub struct Procedure {
    pub workspace: Workspace,
    trees: Vec<(ArcStr, TreeRef)>,
    root: Option<ArcStr>,
    /// Plugin/library names a parser recorded from the procedure's
    /// preamble, informational only to this crate.
    pub plugins: Vec<ArcStr>,
    /// Free-form descriptive attributes from the procedure's preamble
    /// (title, author, revision, ...).
    pub attrs: AttrBag,
}

impl Procedure {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            trees: Vec::new(),
            root: None,
            plugins: Vec::new(),
            attrs: AttrBag::new(),
        }
    }

    /// Add a named top-level instruction tree. The first tree added
    /// becomes the root unless `mark_root` was set on its node.
    pub fn add_tree(&mut self, name: impl Into<ArcStr>, node: Node) -> Result<()> {
        let name = name.into();
        if self.trees.iter().any(|(n, _)| *n == name) {
            return Err(CoreError::DuplicateName { name }.into());
        }
        let is_root = node.is_root() || self.root.is_none();
        if is_root && self.root.is_none() {
            self.root = Some(name.clone());
        }
        self.trees.push((name, StdArc::new(Mutex::new(node))));
        Ok(())
    }

    pub fn root_name(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn tree(&self, name: &str) -> Option<TreeRef> {
        self.trees.iter().find(|(n, _)| n == name).map(|(_, t)| StdArc::clone(t))
    }

    pub fn root(&self) -> Option<TreeRef> {
        self.root.as_deref().and_then(|n| self.tree(n))
    }

    pub fn tree_names(&self) -> impl Iterator<Item = &str> {
        self.trees.iter().map(|(n, _)| n.as_str())
    }

    /// Validate attributes, resolve `Include` references, and set up the
    /// workspace, in that order (§4.1/§4.2). Rejects cyclic includes
    /// (within this procedure's own trees) before any variable or
    /// instruction setup runs, so a rejected `Setup` leaves nothing
    /// partially initialized.
    ///
    /// `Include(file=...)`/`IncludeProcedure` references are resolved here,
    /// not inside the instruction: the owning `Behavior` only ever sees
    /// `SetupCtx::trees_by_name`, never the loader's output directly, so
    /// external workspace variables can be adopted (§9, external-ignored-
    /// on-collision) before any node's `resolve` runs.
    pub fn setup(&mut self, loader: &dyn ProcedureLoader) -> Result<()> {
        self.check_include_cycles()?;
        self.workspace.setup_all()?;

        let mut trees_by_name: FxHashMap<ArcStr, TreeRef> =
            self.trees.iter().map(|(n, t)| (n.clone(), StdArc::clone(t))).collect();

        let mut file_includes = Vec::new();
        for (_, tree) in &self.trees {
            collect_file_includes(&tree.lock(), &mut file_includes);
        }
        for (file, path) in file_includes {
            let mut external = loader.load(&file).map_err(|e| {
                e.context(format!("loading Include(file={file:?})"))
            })?;
            external.setup(loader)?;
            let target = match &path {
                Some(p) => external.tree(p),
                None => external.root(),
            };
            let Some(target) = target else {
                self.workspace.teardown_all();
                anyhow::bail!(
                    "Include(file={file:?}): no usable top-level instruction{}",
                    path.as_deref().map(|p| format!(" named {p:?}")).unwrap_or_default()
                );
            };
            let key = path.unwrap_or_else(|| file.clone());
            trees_by_name.entry(key).or_insert(target);
            self.workspace.merge_external(external.workspace);
        }

        let ctx = SetupCtx { trees_by_name: &trees_by_name, loader };
        for (name, tree) in &self.trees {
            if let Err(e) = tree.lock().setup(&ctx) {
                self.workspace.teardown_all();
                return Err(e).map_err(|e: anyhow::Error| {
                    e.context(format!("setting up tree {name:?}"))
                });
            }
        }
        Ok(())
    }

    pub fn teardown(&mut self) {
        self.workspace.teardown_all();
    }

    fn check_include_cycles(&self) -> Result<()> {
        let mut adjacency: FxHashMap<ArcStr, Vec<ArcStr>> = FxHashMap::default();
        for (name, tree) in &self.trees {
            let mut targets = Vec::new();
            collect_include_targets(&tree.lock(), &mut targets);
            adjacency.insert(name.clone(), targets);
        }
        let mut state: FxHashMap<ArcStr, VisitState> = FxHashMap::default();
        for (name, _) in &self.trees {
            if !matches!(state.get(name), Some(VisitState::Done)) {
                visit(name, &adjacency, &mut state)?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Done,
}

fn visit(
    name: &ArcStr,
    adjacency: &FxHashMap<ArcStr, Vec<ArcStr>>,
    state: &mut FxHashMap<ArcStr, VisitState>,
) -> Result<()> {
    state.insert(name.clone(), VisitState::Visiting);
    if let Some(targets) = adjacency.get(name) {
        for target in targets {
            match state.get(target) {
                Some(VisitState::Visiting) => {
                    return Err(CoreError::CyclicInclude { path: target.clone() }.into());
                }
                Some(VisitState::Done) => continue,
                None => visit(target, adjacency, state)?,
            }
        }
    }
    state.insert(name.clone(), VisitState::Done);
    Ok(())
}

/// Collects same-procedure `path` references for cycle detection. A node
/// carrying a `file` attribute points outside this procedure's tree forest
/// entirely; this crate cannot reason about cycles across files without
/// recursively loading and setting them up, which `check_include_cycles`
/// deliberately runs before (it must stay a cheap, side-effect-free pass).
fn collect_include_targets(node: &Node, out: &mut Vec<ArcStr>) {
    if matches!(node.type_name(), "Include" | "IncludeProcedure") && node.attrs().raw("file").is_none() {
        if let Some(path) = node.attrs().raw("path") {
            out.push(ArcStr::from(path));
        }
    }
    for child in node.children() {
        collect_include_targets(child, out);
    }
}

/// Collects `(file, path)` pairs for every file-based `Include`/
/// `IncludeProcedure` node, in tree order.
fn collect_file_includes(node: &Node, out: &mut Vec<(ArcStr, Option<ArcStr>)>) {
    if matches!(node.type_name(), "Include" | "IncludeProcedure") {
        if let Some(file) = node.attrs().raw("file") {
            let path = node.attrs().raw("path").map(ArcStr::from);
            out.push((ArcStr::from(file), path));
        }
    }
    for child in node.children() {
        collect_file_includes(child, out);
    }
}

/// Convenience default loader for procedures that never use
/// `Include(file=...)`/`IncludeProcedure`.
pub fn unavailable_loader() -> UnavailableLoader {
    UnavailableLoader
}

/// Reset every top-level tree to `NotStarted` (§4.4), e.g. before re-running
/// a procedure that already completed once.
pub fn reset_all(procedure: &Procedure, ui: &dyn UserInterface) {
    for name in procedure.tree_names().collect::<Vec<_>>() {
        if let Some(tree) = procedure.tree(name) {
            tree.lock().reset(ui);
        }
    }
}
