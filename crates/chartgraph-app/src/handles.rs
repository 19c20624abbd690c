use crate::error::AppError;
use chartgraph_core::ComponentId;
use std::collections::HashMap;

/// Renderer-side objects keyed by the component they draw.
///
/// The engine never creates handles itself; a renderer registers them while
/// reacting to `NodeAdded`/`EdgeAdded` and looks them up on later events.
#[derive(Debug, Clone)]
pub struct RenderHandles<H> {
    handles: HashMap<ComponentId, H>,
    root: Option<H>,
}

impl<H> Default for RenderHandles<H> {
    fn default() -> Self {
        Self {
            handles: HashMap::new(),
            root: None,
        }
    }
}

impl<H> RenderHandles<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` for `id`, returning the handle it replaced.
    pub fn register(&mut self, id: impl Into<ComponentId>, handle: H) -> Option<H> {
        self.handles.insert(id.into(), handle)
    }

    pub fn unregister(&mut self, id: impl Into<ComponentId>) -> Option<H> {
        self.handles.remove(&id.into())
    }

    pub fn get(&self, id: impl Into<ComponentId>) -> Option<&H> {
        self.handles.get(&id.into())
    }

    /// Handle for a component that must have been rendered already.
    pub fn require(&self, id: impl Into<ComponentId>) -> Result<&H, AppError> {
        let id = id.into();
        self.handles.get(&id).ok_or(AppError::HandleNotRegistered(id))
    }

    /// Set the element everything else is drawn into. Only allowed once.
    pub fn set_root(&mut self, handle: H) -> Result<(), AppError> {
        if self.root.is_some() {
            return Err(AppError::RootAlreadySet);
        }
        self.root = Some(handle);
        Ok(())
    }

    pub fn root(&self) -> Option<&H> {
        self.root.as_ref()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartgraph_core::{EdgeId, NodeId};

    #[test]
    fn test_require_reports_missing_handle() {
        let mut handles = RenderHandles::new();
        handles.register(NodeId(3), "rect-3");
        assert_eq!(handles.require(NodeId(3)).unwrap(), &"rect-3");
        assert!(matches!(
            handles.require(EdgeId(4)),
            Err(AppError::HandleNotRegistered(ComponentId(4)))
        ));
        assert_eq!(handles.unregister(NodeId(3)), Some("rect-3"));
        assert!(handles.is_empty());
    }

    #[test]
    fn test_root_can_only_be_set_once() {
        let mut handles: RenderHandles<&str> = RenderHandles::new();
        handles.set_root("svg").unwrap();
        assert!(matches!(handles.set_root("other"), Err(AppError::RootAlreadySet)));
        assert_eq!(handles.root(), Some(&"svg"));
    }
}
