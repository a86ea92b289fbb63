use std::time::Duration;

/// Formats the given [Duration] as "MM:SSs"
pub fn format_time(t: Duration) -> String {
    let minutes = t.as_secs() / 60;
    let seconds = t.as_secs() % 60;
    format!("{:02}:{:02}s", minutes, seconds)
}

/// Formats a match offset, given in whole seconds, as "MM:SSs".
pub fn format_offset(offset: u32) -> String {
    format_time(Duration::from_secs(offset.into()))
}

/// Subscriber that records the names of spans as they are entered.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SpanRecorder {
    spans: std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>,
    entered: std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>,
}

#[cfg(test)]
impl SpanRecorder {
    pub(crate) fn entered(&self) -> Vec<&'static str> {
        self.entered.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl tracing::Subscriber for SpanRecorder {
    fn enabled(&self, _: &tracing::Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, attrs: &tracing::span::Attributes<'_>) -> tracing::span::Id {
        let mut spans = self.spans.lock().unwrap();
        spans.push(attrs.metadata().name());
        tracing::span::Id::from_u64(spans.len() as u64)
    }

    fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}

    fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}

    fn event(&self, _: &tracing::Event<'_>) {}

    fn enter(&self, id: &tracing::span::Id) {
        let name = self.spans.lock().unwrap()[id.into_u64() as usize - 1];
        self.entered.lock().unwrap().push(name);
    }

    fn exit(&self, _: &tracing::span::Id) {}
}
