//! 入站事件消费者
//!
//! 供偏好异步投递的传输层使用：传输层把 [`ClientEvent`] 写入 mpsc 通道，
//! 消费任务逐个交给注册中心处理。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::event::ClientEvent;
use crate::registry::NamingRegistry;
use crate::runtime::{Task, TaskResult};

/// 入站事件消费任务
pub struct ClientEventConsumer {
    registry: Arc<NamingRegistry>,
    receiver: mpsc::Receiver<ClientEvent>,
}

impl ClientEventConsumer {
    pub fn new(registry: Arc<NamingRegistry>, receiver: mpsc::Receiver<ClientEvent>) -> Self {
        Self { registry, receiver }
    }

    /// 创建通道并返回发送端与消费任务
    pub fn channel(registry: Arc<NamingRegistry>, capacity: usize) -> (mpsc::Sender<ClientEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(registry, rx))
    }

    fn dispatch(&self, event: ClientEvent) {
        let client_id = event.client_id().to_string();
        if let Err(e) = self.registry.handle_client_event(event) {
            warn!(
                target: "naming::event",
                client_id = %client_id,
                error = %e,
                capacity_exceeded = e.is_capacity_exceeded(),
                "Client event rejected"
            );
        }
    }
}

impl Task for ClientEventConsumer {
    fn name(&self) -> &str {
        "client-event-consumer"
    }

    fn run(
        mut self: Box<Self>,
        mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    ) -> Pin<Box<dyn Future<Output = TaskResult> + Send>> {
        Box::pin(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!(target: "naming::runtime", task_name = "client-event-consumer", "Shutdown signal received");
                        break;
                    }
                    event = self.receiver.recv() => match event {
                        Some(event) => self.dispatch(event),
                        None => {
                            info!(target: "naming::runtime", task_name = "client-event-consumer", "Event channel closed");
                            break;
                        }
                    }
                }
            }
            Ok(())
        })
    }
}
