//! Broadcast bus for run and job lifecycle events.
//!
//! Any number of subscribers see every `WorkflowEvent`; publishing with no
//! subscribers drops the event. `RunSubscription` narrows a subscriber to a
//! single run and ends once that run finishes.

use tokio::sync::broadcast::{self, error::RecvError};
use trainflow_types::event::WorkflowEvent;
use uuid::Uuid;

/// Multi-producer, multi-consumer event bus. Clones share the channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    /// `capacity` bounds how far a slow subscriber may fall behind before
    /// it starts missing events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Follow one run: the given one, or (with `None`) the next run that starts.
    pub fn subscribe_run(&self, run_id: Option<Uuid>) -> RunSubscription {
        RunSubscription {
            rx: self.sender.subscribe(),
            run_id,
            finished: false,
        }
    }

    pub fn publish(&self, event: WorkflowEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

/// Events of a single run, ending after its `RunFinished`.
#[derive(Debug)]
pub struct RunSubscription {
    rx: broadcast::Receiver<WorkflowEvent>,
    /// Bound on the first `RunStarted` when created without a run id.
    run_id: Option<Uuid>,
    finished: bool,
}

impl RunSubscription {
    /// The run being followed, once known.
    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    /// Next event of the followed run; `None` after the run finished or the
    /// bus was dropped. Events lost to lag are skipped.
    pub async fn next(&mut self) -> Option<WorkflowEvent> {
        while !self.finished {
            let event = match self.rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, run_id = ?self.run_id, "run subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            };

            match self.run_id {
                Some(id) if id != event.run_id() => continue,
                Some(_) => {}
                None => match event {
                    WorkflowEvent::RunStarted { run_id, .. } => self.run_id = Some(run_id),
                    _ => continue,
                },
            }
            self.finished = matches!(event, WorkflowEvent::RunFinished { .. });
            return Some(event);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trainflow_types::workflow::WorkflowRunStatus;

    fn started(run_id: Uuid) -> WorkflowEvent {
        WorkflowEvent::RunStarted {
            run_id,
            workflow_name: "stylegan2-train".to_string(),
            trigger_type: "manual".to_string(),
            job_count: 7,
        }
    }

    fn job_started(run_id: Uuid, job: &str) -> WorkflowEvent {
        WorkflowEvent::JobStarted {
            run_id,
            job: job.to_string(),
            instance_type: Some("C5".to_string()),
        }
    }

    fn finished(run_id: Uuid) -> WorkflowEvent {
        WorkflowEvent::RunFinished {
            run_id,
            workflow_name: "stylegan2-train".to_string(),
            status: WorkflowRunStatus::Succeeded,
            duration_ms: 10,
        }
    }

    #[tokio::test]
    async fn every_subscriber_receives_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.clone().subscribe();

        bus.publish(job_started(Uuid::nil(), "cloneStyleGAN2Repo"));

        assert!(matches!(rx1.recv().await.unwrap(), WorkflowEvent::JobStarted { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), WorkflowEvent::JobStarted { .. }));
    }

    #[test]
    fn publish_without_subscribers_is_dropped() {
        let bus = EventBus::default();
        bus.publish(job_started(Uuid::nil(), "a"));
    }

    #[tokio::test]
    async fn run_subscription_binds_to_next_run_and_ends() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe_run(None);
        let ours = Uuid::now_v7();
        let other = Uuid::now_v7();

        // Stray job event from a run whose start we never saw.
        bus.publish(job_started(other, "old"));
        bus.publish(started(ours));
        bus.publish(job_started(other, "interleaved"));
        bus.publish(job_started(ours, "cloneStyleGAN2Repo"));
        bus.publish(finished(ours));
        bus.publish(started(other));

        assert!(matches!(sub.next().await, Some(WorkflowEvent::RunStarted { .. })));
        assert_eq!(sub.run_id(), Some(ours));
        match sub.next().await {
            Some(WorkflowEvent::JobStarted { job, .. }) => assert_eq!(job, "cloneStyleGAN2Repo"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(sub.next().await, Some(WorkflowEvent::RunFinished { .. })));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn run_subscription_skips_lagged_events() {
        let bus = EventBus::new(2);
        let run_id = Uuid::now_v7();
        let mut sub = bus.subscribe_run(Some(run_id));

        for i in 0..10 {
            bus.publish(job_started(run_id, &format!("job{i}")));
        }
        bus.publish(finished(run_id));

        let mut seen = Vec::new();
        while let Some(event) = sub.next().await {
            seen.push(event);
        }
        assert!(seen.len() <= 2);
        assert!(matches!(seen.last(), Some(WorkflowEvent::RunFinished { .. })));
    }

    #[tokio::test]
    async fn dropped_bus_ends_subscription() {
        let bus = EventBus::new(4);
        let mut sub = bus.subscribe_run(None);
        drop(bus);
        assert!(sub.next().await.is_none());
    }
}
