//! Breakpoints (§3/§4.8): an identity-based reference to a specific
//! instruction node plus an armed flag, and the traversal used to decide
//! which node the runner is about to tick next.

use oac_core::{InstructionId, Node};

/// A reference to a specific instruction, by identity, plus whether it is
/// currently armed (§3). A triggered breakpoint stays armed until removed
/// (§4.8) — hitting it does not disarm it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub node: InstructionId,
    pub armed: bool,
}

/// Walks down the first non-terminal branch of `root`, the same top-down
/// order `Tick` itself propagates in, to find the leaf instruction the next
/// `Tick` call will actually reach (§4.8: "the deepest `NotStarted` or
/// `NotFinished` leaf on the traversal"). Compound instructions do not
/// expose *which* child they will tick next beyond "the first one still
/// pending" — this is a reasonable, conservative approximation good enough
/// to arm a breakpoint against; it does not need to match every concrete
/// instruction's exact internal child-selection policy (e.g. `Choice`'s
/// index array), since breakpoints are a debugging aid, not part of tick
/// semantics.
pub fn next_to_tick(root: &Node) -> Option<InstructionId> {
    if root.status().is_terminal() {
        return None;
    }
    Some(deepest_pending(root))
}

fn deepest_pending(node: &Node) -> InstructionId {
    for child in node.children() {
        if !child.status().is_terminal() {
            return deepest_pending(child);
        }
    }
    node.id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use oac_core::instruction::{SetupCtx, TreeRef};
    use oac_core::{Behavior, ExecutionStatus, InstructionType, TickCtx, UnavailableLoader};
    use fxhash::FxHashMap;

    #[derive(Debug, Default)]
    struct NeverDone;

    impl Behavior for NeverDone {
        fn tick(&mut self, _ctx: &mut TickCtx) -> ExecutionStatus {
            ExecutionStatus::NotFinished
        }
    }

    impl InstructionType for NeverDone {
        const NAME: &'static str = "NeverDone";
    }

    #[test]
    fn finds_deepest_non_terminal_leaf() {
        let leaf = Node::new("NeverDone", Box::<NeverDone>::default(), Default::default(), vec![]);
        let leaf_id = leaf.id();
        let mut parent = Node::new("NeverDone", Box::<NeverDone>::default(), Default::default(), vec![leaf]);
        let trees_by_name: FxHashMap<arcstr::ArcStr, TreeRef> = FxHashMap::default();
        let loader = UnavailableLoader;
        let ctx = SetupCtx { trees_by_name: &trees_by_name, loader: &loader };
        parent.setup(&ctx).unwrap();
        assert_eq!(next_to_tick(&parent), Some(leaf_id));
    }
}
