use super::node::NodeId;

/// Successor rule for a node.
pub enum Transition<N: 'static, S> {
    /// Always continue with the given node.
    To(N),
    /// Pick the successor from the run state.
    ///
    /// `targets` lists every node `choose` may return; the graph builder
    /// checks them and the executor rejects anything outside the list.
    Branch {
        targets: &'static [N],
        choose: fn(&S) -> N,
    },
    /// No successor. Only the terminal node ends this way.
    End,
}

impl<N: NodeId, S> Transition<N, S> {
    pub fn to(node: N) -> Self {
        Transition::To(node)
    }

    pub fn branch(targets: &'static [N], choose: fn(&S) -> N) -> Self {
        Transition::Branch { targets, choose }
    }

    /// Every node this rule can lead to.
    pub fn targets(&self) -> Vec<N> {
        match self {
            Transition::To(n) => vec![*n],
            Transition::Branch { targets, .. } => targets.to_vec(),
            Transition::End => vec![],
        }
    }

    /// Resolve the successor against `state`.
    ///
    /// Returns `None` for `End`, or when a predicate picks an undeclared node.
    pub fn resolve(&self, state: &S) -> Option<N> {
        match self {
            Transition::To(n) => Some(*n),
            Transition::Branch { targets, choose } => {
                let next = choose(state);
                targets.contains(&next).then_some(next)
            }
            Transition::End => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Demo {
        A,
        B,
        C,
    }

    impl NodeId for Demo {
        const ALL: &'static [Self] = &[Demo::A, Demo::B, Demo::C];

        fn name(self) -> &'static str {
            match self {
                Demo::A => "a",
                Demo::B => "b",
                Demo::C => "c",
            }
        }
    }

    #[test]
    fn test_fixed_transition() {
        let t: Transition<Demo, i32> = Transition::to(Demo::B);
        assert_eq!(t.resolve(&0), Some(Demo::B));
        assert_eq!(t.targets(), vec![Demo::B]);
    }

    #[test]
    fn test_branch_transition() {
        let t: Transition<Demo, i32> = Transition::branch(&[Demo::B, Demo::C], |n| {
            if *n > 0 {
                Demo::B
            } else {
                Demo::C
            }
        });
        assert_eq!(t.resolve(&1), Some(Demo::B));
        assert_eq!(t.resolve(&-1), Some(Demo::C));
        assert_eq!(t.targets(), vec![Demo::B, Demo::C]);
    }

    #[test]
    fn test_branch_rejects_undeclared_target() {
        let t: Transition<Demo, i32> = Transition::branch(&[Demo::B], |_| Demo::A);
        assert_eq!(t.resolve(&0), None);
    }

    #[test]
    fn test_end_has_no_successor() {
        let t: Transition<Demo, i32> = Transition::End;
        assert_eq!(t.resolve(&0), None);
        assert!(t.targets().is_empty());
    }
}
