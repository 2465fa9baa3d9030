//! Collaborator seams driven by the strategy

use chrono::{DateTime, Utc};

use crate::trading_core::signals::{Annotation, Coordinate, Signal};

/// Order execution on the host platform
pub trait OrderExecutor {
    fn open_long(&mut self, size: u32);

    fn open_short(&mut self, size: u32);

    /// Flatten the open position and return its realized P&L
    fn close_at_market(&mut self) -> f64;

    /// -1 short, 0 flat, +1 long
    fn current_position_sign(&self) -> i8;

    fn current_bid_price(&self) -> f64;

    fn current_ask_price(&self) -> f64;
}

/// Chart annotation layer on the host platform
pub trait AnnotationSink {
    fn on_marker(&mut self, at: Coordinate, kind: Signal);

    fn on_label(&mut self, at: Coordinate, text: &str);

    fn on_remove_last_marker_and_label(&mut self);

    fn on_session_boundary(&mut self, _time: DateTime<Utc>) {}

    /// Route one detector annotation to the matching callback
    fn apply(&mut self, annotation: &Annotation) {
        match annotation {
            Annotation::Marker { at, kind } => self.on_marker(*at, *kind),
            Annotation::Label { at, text } => self.on_label(*at, text),
            Annotation::RemoveLastMarkerAndLabel => self.on_remove_last_marker_and_label(),
            Annotation::SessionBoundary { time } => self.on_session_boundary(*time),
        }
    }
}

/// In-memory annotation layer holding what is currently drawn
#[derive(Debug, Default, Clone)]
pub struct MarkerLayer {
    markers: Vec<(Coordinate, Signal)>,
    labels: Vec<(Coordinate, String)>,
    boundaries: Vec<DateTime<Utc>>,
    removed: usize,
}

impl MarkerLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn markers(&self) -> &[(Coordinate, Signal)] {
        &self.markers
    }

    pub fn labels(&self) -> &[(Coordinate, String)] {
        &self.labels
    }

    pub fn boundaries(&self) -> &[DateTime<Utc>] {
        &self.boundaries
    }

    /// Markers superseded so far
    pub fn removed(&self) -> usize {
        self.removed
    }
}

impl AnnotationSink for MarkerLayer {
    fn on_marker(&mut self, at: Coordinate, kind: Signal) {
        self.markers.push((at, kind));
    }

    fn on_label(&mut self, at: Coordinate, text: &str) {
        self.labels.push((at, text.to_string()));
    }

    fn on_remove_last_marker_and_label(&mut self) {
        if self.markers.pop().is_some() {
            self.removed += 1;
        }
        self.labels.pop();
    }

    fn on_session_boundary(&mut self, time: DateTime<Utc>) {
        self.boundaries.push(time);
    }
}
