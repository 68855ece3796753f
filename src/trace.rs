/*
 * Trace Tree
 *
 * Persistent prefix-shared tree over explored interleavings. A node is a
 * reachable state: the snapshot of the runnable set and pending transitions
 * the interceptor had after replaying the node's path. Navigation is by
 * replay - moving to a node restarts the trial and advances along the edge
 * labels - except when the target lies on the path already executed.
 *
 * Children are cached through weak references, so a node revisited after
 * re-replay is pointer-equal to its first visit while released subtrees
 * still free themselves.
 */

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::error::CheckResult;
use crate::runtime::Runtime;
use crate::transition::Transition;
use crate::types::{ThreadId, ThreadMap, ThreadSet};

pub struct TraceNode {
    parent: Option<Rc<TraceNode>>,
    last_thread: ThreadId,
    runnable: ThreadSet,
    next_transitions: ThreadMap<Transition>,
    children: RefCell<ThreadMap<Weak<TraceNode>>>,
}

impl TraceNode {
    fn snapshot(parent: Option<Rc<TraceNode>>, last_thread: ThreadId, rt: &Runtime) -> TraceNode {
        TraceNode {
            parent,
            last_thread,
            runnable: rt.runnable(),
            next_transitions: rt.next_transitions(),
            children: RefCell::new(ThreadMap::new()),
        }
    }

    pub fn parent(&self) -> Option<&Rc<TraceNode>> {
        self.parent.as_ref()
    }

    /// Edge label from the parent. Meaningless for the root.
    pub fn last_thread(&self) -> ThreadId {
        assert!(self.parent.is_some(), "root has no incoming edge");
        self.last_thread
    }

    pub fn runnable(&self) -> ThreadSet {
        self.runnable
    }

    pub fn next_transitions(&self) -> &ThreadMap<Transition> {
        &self.next_transitions
    }

    pub fn next_transition_of(&self, thread: ThreadId) -> Transition {
        self.next_transitions[thread].clone()
    }

    /// No thread has a pending transition: the trial ended here.
    pub fn is_leaf(&self) -> bool {
        self.next_transitions.len() == 0
    }

    /// Edge labels from the root to this node, as a digit string.
    pub fn path(&self) -> String {
        let mut labels = Vec::new();
        let mut node = self;
        while let Some(parent) = node.parent.as_deref() {
            labels.push(node.last_thread);
            node = parent;
        }
        labels.reverse();
        labels.iter().map(|thread| thread.to_string()).collect()
    }
}

pub struct TraceBuilder {
    root: Rc<TraceNode>,
    current: Rc<TraceNode>,
}

impl TraceBuilder {
    /// Run one fresh trial prologue and snapshot the initial state as the
    /// root.
    pub fn new(rt: &Runtime) -> CheckResult<TraceBuilder> {
        rt.start_new_run()?;
        let root = Rc::new(TraceNode::snapshot(None, ThreadId::ORIGINAL, rt));
        Ok(TraceBuilder {
            current: root.clone(),
            root,
        })
    }

    pub fn root(&self) -> Rc<TraceNode> {
        self.root.clone()
    }

    pub fn current(&self) -> Rc<TraceNode> {
        self.current.clone()
    }

    /// Make `node` the current state, replaying only when necessary. If the
    /// walk from `node` toward the root passes through `current`, the
    /// already-executed prefix is kept and only the tail below `current` is
    /// advanced; otherwise the trial restarts and the whole path replays.
    pub fn move_to(&mut self, rt: &Runtime, node: &Rc<TraceNode>) -> CheckResult<()> {
        let mut path = Vec::new();
        let mut base = node.clone();
        while !Rc::ptr_eq(&base, &self.current) {
            let Some(parent) = base.parent().cloned() else {
                break;
            };
            path.push(base.last_thread());
            base = parent;
        }
        path.reverse();

        if !Rc::ptr_eq(&base, &self.current) {
            rt.start_new_run()?;
        }

        for thread in path {
            rt.advance_thread(thread)?;
        }

        self.current = node.clone();
        Ok(())
    }

    /// Advance `thread` from the current state and return the child node,
    /// pointer-equal across revisits.
    pub fn extend(&mut self, rt: &Runtime, thread: ThreadId) -> CheckResult<Rc<TraceNode>> {
        rt.advance_thread(thread)?;

        let cached = self
            .current
            .children
            .borrow()
            .get(thread)
            .and_then(Weak::upgrade);

        self.current = match cached {
            Some(child) => child,
            None => {
                let child = Rc::new(TraceNode::snapshot(
                    Some(self.current.clone()),
                    thread,
                    rt,
                ));
                self.current.children.borrow_mut()[thread] = Rc::downgrade(&child);
                child
            }
        };

        Ok(self.current.clone())
    }
}
