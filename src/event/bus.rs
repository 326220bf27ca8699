//! 事件总线
//!
//! 两种投递方式：
//! - 进程内监听者：构造期注册，`publish` 时同步回调；
//! - 对外广播：`async-broadcast` 通道，溢出模式下丢弃最旧事件。

use async_broadcast::{InactiveReceiver, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

use super::NamingEvent;

/// 进程内事件监听者
pub trait NamingEventListener: Send + Sync {
    /// 监听者名称，用于日志
    fn name(&self) -> &str;

    /// 处理事件，`bus` 用于发布派生事件
    fn on_event(&self, event: &NamingEvent, bus: &EventBus);
}

/// 事件总线
pub struct EventBus {
    // 只持有弱引用，监听者的生命周期由注册中心管理
    listeners: RwLock<Vec<Weak<dyn NamingEventListener>>>,
    sender: Sender<NamingEvent>,
    // 保持通道打开，没有对外订阅者时发布不会失败
    _inactive: InactiveReceiver<NamingEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (mut sender, receiver) = async_broadcast::broadcast(capacity.max(1));
        sender.set_overflow(true);
        Self {
            listeners: RwLock::new(Vec::new()),
            sender,
            _inactive: receiver.deactivate(),
        }
    }

    /// 注册进程内监听者
    pub fn register_listener(&self, listener: Arc<dyn NamingEventListener>) {
        debug!(target: "naming::event", listener = listener.name(), "Listener registered");
        self.listeners.write().push(Arc::downgrade(&listener));
    }

    /// 新建对外订阅
    pub fn subscribe(&self) -> Receiver<NamingEvent> {
        self.sender.new_receiver()
    }

    /// 发布事件
    pub fn publish(&self, event: NamingEvent) {
        // 复制一份监听者列表，回调期间不持有锁，允许监听者再次发布
        let listeners: Vec<Arc<dyn NamingEventListener>> =
            self.listeners.read().iter().filter_map(Weak::upgrade).collect();
        for listener in &listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_event(&event, self)));
            if outcome.is_err() {
                error!(
                    target: "naming::event",
                    listener = listener.name(),
                    event = event.name(),
                    "Listener panicked while handling event"
                );
            }
        }

        match self.sender.try_broadcast(event) {
            Ok(Some(dropped)) => {
                warn!(target: "naming::event", dropped = dropped.name(), "Event bus overflow, oldest event dropped");
            }
            Ok(None) => {}
            Err(TrySendError::Inactive(_)) => {}
            Err(TrySendError::Full(ev)) => {
                warn!(target: "naming::event", event = ev.name(), "Event bus full, event dropped");
            }
            Err(TrySendError::Closed(ev)) => {
                warn!(target: "naming::event", event = ev.name(), "Event bus closed, event dropped");
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().len())
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}
