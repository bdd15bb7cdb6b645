//! Notifications bubbling up the tree and observers watching rebuilds.

use core::any::Any;

use crate::element::ElementId;
use crate::tree::ElementTree;
use crate::widget::WidgetKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ObserverEvent {
    WillRebuild,
    DidRebuild,
    DidUnmount,
}

impl ElementTree {
    /// Bubbles `notification` from `from` towards the root, offering it to every proxy element
    /// on the way. Returns `true` once one of them consumes it.
    pub fn dispatch_notification(&self, from: ElementId, notification: &dyn Any) -> bool {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let Some(node) = self.elements.get(id) else {
                return false;
            };
            if let WidgetKind::Proxy(proxy) = node.widget.kind()
                && proxy.on_notification(notification)
            {
                tracing::trace!(element = ?id, "notification consumed");
                return true;
            }
            cursor = node.parent;
        }
        false
    }

    pub(crate) fn notify_observers(
        &self,
        observers: &[ElementId],
        element: ElementId,
        event: ObserverEvent,
    ) {
        for observer in observers {
            let Some(node) = self.elements.get(*observer) else {
                continue;
            };
            if let WidgetKind::Observer(observer) = node.widget.kind() {
                match event {
                    ObserverEvent::WillRebuild => observer.will_rebuild(element),
                    ObserverEvent::DidRebuild => observer.did_rebuild(element),
                    ObserverEvent::DidUnmount => observer.did_unmount(element),
                }
            }
        }
    }
}
