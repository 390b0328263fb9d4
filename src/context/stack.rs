use crate::calls::types::CallId;

/// Ordered chain of active calls in one execution unit, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationStack {
    ids: Vec<CallId>,
}

impl InvocationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: CallId) {
        self.ids.push(id);
    }

    pub fn pop(&mut self) -> Option<CallId> {
        self.ids.pop()
    }

    /// Innermost call, i.e. the caller of the next nested invocation.
    pub fn current(&self) -> Option<CallId> {
        self.ids.last().copied()
    }

    pub fn depth(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[CallId] {
        &self.ids
    }
}
