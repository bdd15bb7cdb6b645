//! Inherited-value propagation.
//!
//! Every element carries an index from inherited widget type to the nearest provider above it.
//! The index is shared with the parent and only copied when a provider adds itself, so lookups
//! are a single hash probe no matter how deep the element sits.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::TypeId;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::element::{Aspect, Dependency, ElementData, ElementId};
use crate::tree::ElementTree;
use crate::widget::{AnyWidget, InheritedWidget, WidgetKind};

impl ElementTree {
    /// Recomputes the inherited index, observer list and resource parent of `id` from its parent.
    pub(crate) fn update_inheritance(&mut self, id: ElementId) {
        let Some(node) = self.elements.get(id) else {
            return;
        };
        let (mut inherited, observers, resource_parent) =
            match node.parent.and_then(|p| Some((p, self.elements.get(p)?))) {
                Some((parent_id, parent)) => {
                    let observers = if matches!(parent.widget.kind(), WidgetKind::Observer(_)) {
                        let mut observers = parent.observers.to_vec();
                        observers.push(parent_id);
                        Rc::from(observers)
                    } else {
                        parent.observers.clone()
                    };
                    let resource_parent = if matches!(parent.data, ElementData::Resource(_)) {
                        Some(parent_id)
                    } else {
                        parent.resource_parent
                    };
                    (parent.inherited.clone(), observers, resource_parent)
                }
                None => (Rc::default(), Rc::from(Vec::new()), None),
            };
        if matches!(node.widget.kind(), WidgetKind::Inherited(_)) {
            let mut index: HashMap<TypeId, ElementId> = (*inherited).clone();
            index.insert(node.widget.widget_type(), id);
            inherited = Rc::new(index);
        }
        if let Some(node) = self.elements.get_mut(id) {
            node.inherited = inherited;
            node.observers = observers;
            node.resource_parent = resource_parent;
        }
    }

    /// The nearest provider of widget type `provider_type` above `id`, without subscribing.
    pub(crate) fn find_provider(&self, id: ElementId, provider_type: TypeId) -> Option<ElementId> {
        self.elements.get(id)?.inherited.get(&provider_type).copied()
    }

    /// Subscribes `id` to the nearest provider of `provider_type`.
    pub(crate) fn depend_on_provider(
        &mut self,
        id: ElementId,
        provider_type: TypeId,
        aspect: Option<Aspect>,
    ) -> Option<ElementId> {
        let provider = self.find_provider(id, provider_type)?;
        if let ElementData::Inherited(dependents) = &mut self.elements.get_mut(provider)?.data {
            match dependents.entry(id) {
                Entry::Occupied(mut entry) => entry.get_mut().add(aspect),
                Entry::Vacant(entry) => {
                    entry.insert(Dependency::new(aspect));
                }
            }
        }
        self.elements.get_mut(id)?.dependencies.insert(provider);
        Some(provider)
    }

    /// Tells every subscriber of `provider` that cares about the change from `old`.
    pub(crate) fn notify_dependents(
        &mut self,
        provider: ElementId,
        old: &AnyWidget,
        widget: &dyn InheritedWidget,
    ) {
        let dependents: Vec<(ElementId, Dependency)> = match self.elements.get(provider) {
            Some(node) => match &node.data {
                ElementData::Inherited(dependents) => dependents
                    .iter()
                    .map(|(id, dependency)| (*id, dependency.clone()))
                    .collect(),
                _ => return,
            },
            None => return,
        };
        for (dependent, dependency) in dependents {
            let notify = match &dependency {
                Dependency::All => true,
                Dependency::Aspects(aspects) => aspects
                    .iter()
                    .any(|aspect| widget.update_should_notify_dependent(old, aspect.as_any())),
            };
            if notify {
                tracing::trace!(?provider, ?dependent, "dependency changed");
                self.dependencies_changed(dependent);
            }
        }
    }

    /// Flags a stateful element's `did_change_dependencies` and schedules the rebuild.
    pub(crate) fn dependencies_changed(&mut self, id: ElementId) {
        if let Some(slot) = self
            .elements
            .get_mut(id)
            .and_then(crate::element::ElementNode::stateful_mut)
        {
            slot.dependencies_changed = true;
        }
        self.mark_dirty(id);
    }
}
