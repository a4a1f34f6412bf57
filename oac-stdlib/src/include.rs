//! Include, IncludeProcedure (§4.5).

use anyhow::{bail, Result};
use oac_core::attr::{AttrDef, AttrSchema};
use oac_core::instruction::{SetupCtx, TreeRef};
use oac_core::{AttrBag, Behavior, ExecutionStatus, InstructionType, TickCtx};

fn path_def() -> AttrDef {
    AttrDef::literal("path").mandatory()
}

fn file_def() -> AttrDef {
    AttrDef::literal("file")
}

/// A decorator whose child is resolved at `Setup` to another top-level
/// instruction tree, owned elsewhere (§4.5/§9): the reference is a clone
/// of the procedure's [`TreeRef`] handle, never a second owner of the
/// `Node` itself.
///
/// `Include(file=...)` is resolved the same way as a same-procedure
/// `Include`: `Procedure::setup` loads the external file once, up front,
/// and registers its target tree into `SetupCtx::trees_by_name` under
/// `path` (or `file`, if `path` is absent); this behavior never touches
/// the loader directly.
#[derive(Debug, Default)]
pub struct Include {
    target: Option<TreeRef>,
}

impl Behavior for Include {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(path_def()).def(file_def())
    }

    fn validate_children(&self, count: usize) -> Result<()> {
        if count != 0 {
            bail!("Include takes no inline children; its child is the resolved reference");
        }
        Ok(())
    }

    fn resolve(&mut self, attrs: &AttrBag, ctx: &SetupCtx) -> Result<()> {
        let key = attrs.raw("path").expect("mandatory, validated at Setup");
        let Some(target) = ctx.trees_by_name.get(key) else {
            bail!("Include: no top-level instruction named {key:?}");
        };
        self.target = Some(target.clone());
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let Some(target) = &self.target else { return ExecutionStatus::Failure };
        target.lock().tick(ctx.ws, ctx.ui)
    }

    fn on_halt(&self) {
        if let Some(target) = &self.target {
            target.lock().halt();
        }
    }
}

impl InstructionType for Include {
    const NAME: &'static str = "Include";
}

/// As [`Include`], but `file` is mandatory and the external procedure's
/// workspace variables are adopted into the current one when no
/// same-named local variable already exists (§4.5/§9 open question:
/// resolved as external-ignored-on-collision). The actual merge happens
/// in `Procedure::setup`, which holds the mutable workspace reference this
/// behavior deliberately never gets; by the time `resolve` runs here, the
/// merge has already completed and `path`/`file` resolves through
/// `SetupCtx::trees_by_name` exactly like a plain `Include`.
#[derive(Debug, Default)]
pub struct IncludeProcedure {
    inner: Include,
}

impl Behavior for IncludeProcedure {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(file_def().mandatory()).def(AttrDef::literal("path"))
    }

    fn validate_children(&self, count: usize) -> Result<()> {
        self.inner.validate_children(count)
    }

    fn resolve(&mut self, attrs: &AttrBag, ctx: &SetupCtx) -> Result<()> {
        let file = attrs.raw("file").expect("mandatory, validated at Setup");
        let key = attrs.raw("path").unwrap_or(file);
        let Some(target) = ctx.trees_by_name.get(key) else {
            bail!("IncludeProcedure: no usable top-level instruction from {file:?}");
        };
        self.inner.target = Some(target.clone());
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        self.inner.tick(ctx)
    }

    fn on_halt(&self) {
        self.inner.on_halt()
    }
}

impl InstructionType for IncludeProcedure {
    const NAME: &'static str = "IncludeProcedure";
}
