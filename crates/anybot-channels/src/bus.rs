//! Event bus collecting inbound events from every registered source

use anybot_core::types::InboundEvent;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Trait that all inbound transports implement
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Start listening, forwarding events to `tx` until `cancel` fires.
    /// Implementations spawn their own task and return once it is running.
    async fn start(&self, tx: mpsc::Sender<InboundEvent>, cancel: CancellationToken) -> Result<()>;

    fn name(&self) -> &str;
}

pub struct EventBus {
    sources: Vec<Box<dyn EventSource>>,
    tx: mpsc::Sender<InboundEvent>,
    rx: mpsc::Receiver<InboundEvent>,
}

impl EventBus {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        info!("Created event bus with buffer size {}", buffer_size);
        Self {
            sources: Vec::new(),
            tx,
            rx,
        }
    }

    pub fn register(&mut self, source: Box<dyn EventSource>) {
        info!("Registering event source: {}", source.name());
        self.sources.push(source);
    }

    pub async fn start_all(&self, cancel: &CancellationToken) -> Result<()> {
        info!("Starting all {} registered sources", self.sources.len());
        for source in &self.sources {
            debug!("Starting source: {}", source.name());
            if let Err(e) = source.start(self.tx.clone(), cancel.child_token()).await {
                error!("Failed to start source {}: {}", source.name(), e);
                return Err(anyhow!("Failed to start source {}: {}", source.name(), e));
            }
            info!("Successfully started source: {}", source.name());
        }
        Ok(())
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Hand over the receiving end. The bus's own sender is dropped so the
    /// receiver closes once every source has stopped.
    pub fn into_receiver(self) -> mpsc::Receiver<InboundEvent> {
        self.rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anybot_core::types::AppMention;

    struct OneShot;

    #[async_trait]
    impl EventSource for OneShot {
        async fn start(&self, tx: mpsc::Sender<InboundEvent>, _cancel: CancellationToken) -> Result<()> {
            tokio::spawn(async move {
                let _ = tx
                    .send(InboundEvent::AppMention(AppMention {
                        user_id: "U1".into(),
                        channel_id: "C1".into(),
                        text: "hello".into(),
                    }))
                    .await;
            });
            Ok(())
        }

        fn name(&self) -> &str {
            "one-shot"
        }
    }

    struct Broken;

    #[async_trait]
    impl EventSource for Broken {
        async fn start(&self, _tx: mpsc::Sender<InboundEvent>, _cancel: CancellationToken) -> Result<()> {
            Err(anyhow!("no token"))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_events_flow_and_receiver_closes() {
        let mut bus = EventBus::new(4);
        bus.register(Box::new(OneShot));
        assert_eq!(bus.source_count(), 1);

        bus.start_all(&CancellationToken::new()).await.unwrap();
        let mut rx = bus.into_receiver();

        assert_eq!(rx.recv().await.map(|e| e.kind().to_string()), Some("app_mention".to_string()));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_start_failure_names_source() {
        let mut bus = EventBus::new(4);
        bus.register(Box::new(Broken));
        let err = bus.start_all(&CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
