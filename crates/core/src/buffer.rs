// crates/core/src/buffer.rs
//! Per-operation ordered event log with display-only clearing.

use opwatch_types::{OperationEvent, Severity};

/// Append-only log of the events received for one operation.
///
/// `clear` only moves the display window: events stay in the buffer because
/// the progress reconciler still needs them.
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    events: Vec<OperationEvent>,
    /// Buffer length at the last user clear; entries before it are hidden.
    cleared_at: usize,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append in arrival order. Amortized O(1).
    pub fn append(&mut self, event: OperationEvent) {
        self.events.push(event);
    }

    /// Hide everything received so far. Later appends remain visible.
    pub fn clear(&mut self) {
        self.cleared_at = self.events.len();
    }

    /// Every event ever appended, including cleared ones.
    pub fn all(&self) -> &[OperationEvent] {
        &self.events
    }

    /// Events appended since the last clear.
    pub fn visible(&self) -> &[OperationEvent] {
        &self.events[self.cleared_at..]
    }

    /// Lazily filtered view over the visible events. The view is `Copy`, so
    /// iterating it again restarts from the first matching event.
    pub fn filter(&self, severity: Option<Severity>) -> EventView<'_> {
        EventView {
            events: self.visible(),
            severity,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn visible_len(&self) -> usize {
        self.events.len() - self.cleared_at
    }
}

/// Read-only, restartable view over a buffer's visible events.
#[derive(Debug, Clone, Copy)]
pub struct EventView<'a> {
    events: &'a [OperationEvent],
    severity: Option<Severity>,
}

impl<'a> EventView<'a> {
    pub fn iter(&self) -> ViewIter<'a> {
        ViewIter {
            inner: self.events.iter(),
            severity: self.severity,
        }
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn to_vec(&self) -> Vec<OperationEvent> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for EventView<'a> {
    type Item = &'a OperationEvent;
    type IntoIter = ViewIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator produced by [`EventView`].
#[derive(Debug, Clone)]
pub struct ViewIter<'a> {
    inner: std::slice::Iter<'a, OperationEvent>,
    severity: Option<Severity>,
}

impl<'a> Iterator for ViewIter<'a> {
    type Item = &'a OperationEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let severity = self.severity;
        self.inner
            .find(|event| severity.map_or(true, |wanted| event.severity == wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(severity: Severity, text: &str) -> OperationEvent {
        OperationEvent {
            severity,
            text: text.into(),
            ..Default::default()
        }
    }

    fn texts(view: EventView<'_>) -> Vec<&str> {
        view.into_iter().map(|e| e.text.as_str()).collect()
    }

    #[test]
    fn test_append_preserves_arrival_order() {
        let mut buffer = EventBuffer::new();
        buffer.append(event(Severity::Info, "a"));
        buffer.append(event(Severity::Error, "b"));
        buffer.append(event(Severity::Debug, "c"));
        assert_eq!(texts(buffer.filter(None)), vec!["a", "b", "c"]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_clear_then_append_shows_only_new_events() {
        let mut buffer = EventBuffer::new();
        buffer.append(event(Severity::Info, "old-1"));
        buffer.append(event(Severity::Info, "old-2"));

        buffer.clear();
        assert!(buffer.filter(None).is_empty());

        buffer.append(event(Severity::Info, "new-1"));
        buffer.append(event(Severity::Warning, "new-2"));

        assert_eq!(texts(buffer.filter(None)), vec!["new-1", "new-2"]);
        assert_eq!(buffer.visible_len(), 2);
        // Reconciliation still sees the full history.
        assert_eq!(buffer.all().len(), 4);
        assert_eq!(buffer.all()[0].text, "old-1");
    }

    #[test]
    fn test_repeated_clear_only_hides_up_to_current_length() {
        let mut buffer = EventBuffer::new();
        buffer.append(event(Severity::Info, "a"));
        buffer.clear();
        buffer.clear();
        buffer.append(event(Severity::Info, "b"));
        assert_eq!(texts(buffer.filter(None)), vec!["b"]);
    }

    #[test]
    fn test_filter_by_severity_does_not_mutate() {
        let mut buffer = EventBuffer::new();
        buffer.append(event(Severity::Info, "a"));
        buffer.append(event(Severity::Error, "b"));
        buffer.append(event(Severity::Error, "c"));

        let errors = buffer.filter(Some(Severity::Error));
        assert_eq!(texts(errors), vec!["b", "c"]);
        assert_eq!(errors.count(), 2);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_view_is_restartable() {
        let mut buffer = EventBuffer::new();
        buffer.append(event(Severity::Warning, "w"));
        buffer.append(event(Severity::Info, "i"));

        let view = buffer.filter(Some(Severity::Warning));
        let first: Vec<_> = view.iter().collect();
        let second: Vec<_> = view.iter().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }
}
