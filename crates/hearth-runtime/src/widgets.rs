//! UI widget descriptors emitted by command handlers.

#![allow(missing_docs)]

use indexmap::IndexMap;
use serde::Serialize;
use smol_str::SmolStr;
use tracing::debug;

/// What to render, where, and which state key it is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidgetDescriptor {
    pub label: SmolStr,
    pub page: SmolStr,
    pub order: i32,
    pub widget: SmolStr,
    pub key: SmolStr,
}

impl WidgetDescriptor {
    #[must_use]
    pub fn new(
        widget: impl Into<SmolStr>,
        key: impl Into<SmolStr>,
        label: impl Into<SmolStr>,
        page: impl Into<SmolStr>,
        order: i32,
    ) -> Self {
        Self {
            label: label.into(),
            page: page.into(),
            order,
            widget: widget.into(),
            key: key.into(),
        }
    }
}

/// Consumer of widget descriptors (renderer, page builder).
pub trait WidgetSink {
    fn emit(&mut self, descriptor: WidgetDescriptor);
}

/// In-memory widget registry.
///
/// A descriptor is identified by its bound key: re-running a declaration
/// replaces the earlier descriptor in place instead of duplicating it.
#[derive(Debug, Default)]
pub struct WidgetRegistry {
    widgets: IndexMap<SmolStr, WidgetDescriptor>,
}

impl WidgetRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&WidgetDescriptor> {
        self.widgets.get(key)
    }

    /// Descriptors in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &WidgetDescriptor> {
        self.widgets.values()
    }

    /// Descriptors of one page, sorted by `order` (stable for ties).
    #[must_use]
    pub fn page(&self, page: &str) -> Vec<&WidgetDescriptor> {
        let mut widgets: Vec<_> = self
            .widgets
            .values()
            .filter(|widget| widget.page == page)
            .collect();
        widgets.sort_by_key(|widget| widget.order);
        widgets
    }

    /// Page names in first-seen order.
    #[must_use]
    pub fn pages(&self) -> Vec<&str> {
        let mut pages: Vec<&str> = Vec::new();
        for widget in self.widgets.values() {
            if !pages.contains(&widget.page.as_str()) {
                pages.push(widget.page.as_str());
            }
        }
        pages
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.widgets
                .values()
                .filter_map(|widget| serde_json::to_value(widget).ok())
                .collect(),
        )
    }

    pub fn clear(&mut self) {
        self.widgets.clear();
    }
}

impl WidgetSink for WidgetRegistry {
    fn emit(&mut self, descriptor: WidgetDescriptor) {
        debug!(
            key = descriptor.key.as_str(),
            widget = descriptor.widget.as_str(),
            page = descriptor.page.as_str(),
            "widget"
        );
        self.widgets.insert(descriptor.key.clone(), descriptor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redeclaration_replaces_in_place() {
        let mut registry = WidgetRegistry::new();
        registry.emit(WidgetDescriptor::new("toggle", "buttonA", "Lamp", "Hall", 1));
        registry.emit(WidgetDescriptor::new("range", "pwmB", "Dimmer", "Hall", 2));
        registry.emit(WidgetDescriptor::new("toggle", "buttonA", "Lamp 2", "Hall", 1));
        assert_eq!(registry.len(), 2);
        let labels: Vec<_> = registry.iter().map(|w| w.label.as_str()).collect();
        assert_eq!(labels, vec!["Lamp 2", "Dimmer"]);
    }

    #[test]
    fn page_is_sorted_by_order() {
        let mut registry = WidgetRegistry::new();
        registry.emit(WidgetDescriptor::new("anydata", "temp1", "Temp", "Climate", 5));
        registry.emit(WidgetDescriptor::new("anydata", "hum1", "Humidity", "Climate", 2));
        registry.emit(WidgetDescriptor::new("toggle", "buttonA", "Lamp", "Hall", 1));
        let keys: Vec<_> = registry
            .page("Climate")
            .iter()
            .map(|w| w.key.as_str())
            .collect();
        assert_eq!(keys, vec!["hum1", "temp1"]);
        assert_eq!(registry.pages(), vec!["Climate", "Hall"]);
    }

    #[test]
    fn json_carries_all_fields() {
        let mut registry = WidgetRegistry::new();
        registry.emit(WidgetDescriptor::new("inputNum", "digit1", "Setpoint", "Main", 3));
        assert_eq!(
            registry.to_json().to_string(),
            r#"[{"label":"Setpoint","page":"Main","order":3,"widget":"inputNum","key":"digit1"}]"#
        );
    }
}
