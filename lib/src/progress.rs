use crossbeam_channel::{Sender, TrySendError};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::errors::ObserverError;

/// The state of a style transfer after one optimization step
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct ProgressEvent {
    /// The step that just finished, starting at 1
    pub current: u32,
    /// The total number of steps in the run
    pub total: u32,
    /// The total weighted loss at this step
    pub loss: f32,
    /// The weighted content component of `loss`
    pub content_loss: f32,
    /// The weighted style component of `loss`
    pub style_loss: f32,
    /// `current / total` as a percentage
    pub percentage: f32,
    /// Set on the final event of a run
    pub completed: bool,
}

impl ProgressEvent {
    pub(crate) fn new(current: u32, total: u32, loss: crate::loss::LossValues) -> Self {
        Self {
            current,
            total,
            loss: loss.total,
            content_loss: loss.content,
            style_loss: loss.style,
            percentage: current as f32 / total as f32 * 100.0,
            completed: current == total,
        }
    }
}

/// Allows a session to update external callers with the progress of the
/// optimization.
///
/// Failures are logged by the session and otherwise ignored, a failing
/// observer never stops a run.
pub trait Progress {
    fn update(&mut self, event: ProgressEvent) -> Result<(), ObserverError>;
}

impl<G> Progress for G
where
    G: FnMut(ProgressEvent) + Send,
{
    fn update(&mut self, event: ProgressEvent) -> Result<(), ObserverError> {
        self(event);
        Ok(())
    }
}

/// Forwards progress events into a channel without ever blocking the
/// optimization, events that don't fit into a bounded channel are dropped.
///
/// ```no_run
/// let (tx, rx) = neural_style::crossbeam_channel::unbounded::<neural_style::ProgressEvent>();
/// let progress = neural_style::ChannelProgress::new(tx);
///
/// std::thread::spawn(move || {
///     for event in rx {
///         println!("{}/{} loss {}", event.current, event.total, event.loss);
///     }
/// });
/// ```
pub struct ChannelProgress {
    tx: Sender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(tx: Sender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl Progress for ChannelProgress {
    fn update(&mut self, event: ProgressEvent) -> Result<(), ObserverError> {
        self.tx.try_send(event).map_err(|err| match err {
            TrySendError::Full(_) => ObserverError::Full,
            TrySendError::Disconnected(_) => ObserverError::Disconnected,
        })
    }
}

/// A cheaply cloneable flag used to stop a running session between steps
#[derive(Clone, Default, Debug)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::loss::LossValues;

    fn values() -> LossValues {
        LossValues {
            content: 1.0,
            style: 2.5,
            total: 3.5,
        }
    }

    #[test]
    fn events_flag_completion() {
        let first = ProgressEvent::new(1, 4, values());
        assert!(!first.completed);
        assert_eq!(first.percentage, 25.0);

        let last = ProgressEvent::new(4, 4, values());
        assert!(last.completed);
        assert_eq!(last.percentage, 100.0);
    }

    #[test]
    fn events_serialize_for_the_web() {
        let json = serde_json::to_value(ProgressEvent::new(2, 4, values())).unwrap();

        assert_eq!(json["current"], 2);
        assert_eq!(json["total"], 4);
        assert_eq!(json["percentage"], 50.0);
        assert_eq!(json["completed"], false);
        assert_eq!(json["loss"], 3.5);
    }

    #[test]
    fn channel_failures_are_reported() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut progress = ChannelProgress::new(tx);

        progress.update(ProgressEvent::new(1, 3, values())).unwrap();
        assert!(matches!(
            progress.update(ProgressEvent::new(2, 3, values())),
            Err(ObserverError::Full)
        ));

        drop(rx);
        assert!(matches!(
            progress.update(ProgressEvent::new(3, 3, values())),
            Err(ObserverError::Disconnected)
        ));
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());

        token.cancel();
        assert!(other.is_cancelled());
    }
}
