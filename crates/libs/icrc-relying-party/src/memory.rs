//! An in-process window host.
//!
//! Two simulated windows post to each other through broadcast channels. A
//! message only arrives when the target origin is `"*"` or the receiving
//! window's origin, the same rule a browser applies to `postMessage`.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use icrc_rpc::{parse_origin, MessageEvent, MessageTarget, WindowId};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::window::{Popup, ScreenGeometry, WindowHost};

/// Messages a window buffers per subscriber. A subscriber that falls further
/// behind loses the oldest ones, which for a pending request can include its
/// response.
const CHANNEL_CAPACITY: usize = 256;

/// Called synchronously from [`WindowHost::open`], before the relying party
/// can post anything, so whatever runs in the popup can subscribe in time.
pub type OpenHandler = Box<dyn Fn(OpenedWindow) + Send + Sync>;

pub struct OpenedWindow {
    pub url: String,
    pub name: String,
    pub features: Option<String>,
    pub window: Arc<MemoryWindow>,
    /// Posts back to the relying-party window as this popup.
    pub opener: Arc<dyn MessageTarget>,
}

fn accepts(target_origin: &str, origin: &str) -> bool {
    target_origin == "*" || target_origin == origin
}

pub struct MemoryWindow {
    id: WindowId,
    origin: String,
    opener_id: WindowId,
    opener_origin: String,
    inbox: broadcast::Sender<MessageEvent>,
    closed: AtomicBool,
    focused: AtomicUsize,
}

impl MemoryWindow {
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Messages posted to this window.
    pub fn subscribe(&self) -> broadcast::Receiver<MessageEvent> {
        self.inbox.subscribe()
    }

    pub fn focus_count(&self) -> usize {
        self.focused.load(Ordering::Acquire)
    }
}

impl MessageTarget for MemoryWindow {
    fn post_message(&self, data: Value, target_origin: &str) {
        if self.is_closed() {
            log::trace!("memory(post): window {} is closed, dropping message", self.id);
            return;
        }
        if !accepts(target_origin, &self.origin) {
            log::trace!(
                "memory(post): target origin {target_origin} does not match {}, dropping message",
                self.origin
            );
            return;
        }
        let _ = self.inbox.send(MessageEvent {
            origin: self.opener_origin.clone(),
            source: Some(self.opener_id),
            data,
        });
    }
}

impl Popup for MemoryWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    fn focus(&self) {
        self.focused.fetch_add(1, Ordering::AcqRel);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// The popup's handle on its opener.
struct OpenerTarget {
    popup: Arc<MemoryWindow>,
    inbox: broadcast::Sender<MessageEvent>,
    origin: String,
}

impl MessageTarget for OpenerTarget {
    fn post_message(&self, data: Value, target_origin: &str) {
        if self.popup.is_closed() || !accepts(target_origin, &self.origin) {
            return;
        }
        let _ = self.inbox.send(MessageEvent {
            origin: self.popup.origin.clone(),
            source: Some(self.popup.id),
            data,
        });
    }
}

/// The relying party's window.
pub struct MemoryHost {
    id: WindowId,
    origin: String,
    inbox: broadcast::Sender<MessageEvent>,
    geometry: Option<ScreenGeometry>,
    next_id: AtomicU64,
    refuse_popups: AtomicBool,
    on_open: Mutex<Option<OpenHandler>>,
    opened: Mutex<Vec<Arc<MemoryWindow>>>,
}

impl MemoryHost {
    pub fn new(origin: impl Into<String>) -> Self {
        let (inbox, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            id: 1,
            origin: origin.into(),
            inbox,
            geometry: Some(ScreenGeometry {
                inner_width: 1_280.0,
                inner_height: 720.0,
                outer_height: 800.0,
                screen_x: 0.0,
                screen_y: 0.0,
            }),
            next_id: AtomicU64::new(2),
            refuse_popups: AtomicBool::new(false),
            on_open: Mutex::new(None),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn on_open(&self, handler: impl Fn(OpenedWindow) + Send + Sync + 'static) {
        *self.on_open.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(handler));
    }

    /// Makes [`WindowHost::open`] fail, as a popup blocker would.
    pub fn refuse_popups(&self, refuse: bool) {
        self.refuse_popups.store(refuse, Ordering::Release);
    }

    /// Delivers `event` to the relying-party window as is.
    pub fn deliver(&self, event: MessageEvent) {
        let _ = self.inbox.send(event);
    }

    /// Popups opened so far, oldest first.
    pub fn opened(&self) -> Vec<Arc<MemoryWindow>> {
        self.opened.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl WindowHost for MemoryHost {
    fn open(&self, url: &str, name: &str, features: Option<&str>) -> Option<Arc<dyn Popup>> {
        if self.refuse_popups.load(Ordering::Acquire) {
            return None;
        }
        let (inbox, _) = broadcast::channel(CHANNEL_CAPACITY);
        let window = Arc::new(MemoryWindow {
            id: self.next_id.fetch_add(1, Ordering::AcqRel),
            origin: parse_origin(url).unwrap_or_default(),
            opener_id: self.id,
            opener_origin: self.origin.clone(),
            inbox,
            closed: AtomicBool::new(false),
            focused: AtomicUsize::new(0),
        });
        log::debug!("memory(open): window {} at {url}", window.id);
        self.opened.lock().unwrap_or_else(PoisonError::into_inner).push(window.clone());

        if let Some(handler) = self.on_open.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            handler(OpenedWindow {
                url: url.to_string(),
                name: name.to_string(),
                features: features.map(str::to_string),
                window: window.clone(),
                opener: Arc::new(OpenerTarget {
                    popup: window.clone(),
                    inbox: self.inbox.clone(),
                    origin: self.origin.clone(),
                }),
            });
        }
        Some(window)
    }

    fn subscribe(&self) -> broadcast::Receiver<MessageEvent> {
        self.inbox.subscribe()
    }

    fn geometry(&self) -> Option<ScreenGeometry> {
        self.geometry
    }
}
