//! Popup windows and the host that opens them.
//!
//! A browser tab becomes a [`WindowHost`]: it opens popups, reports its own
//! geometry for placement and hands out a receiver for every message posted
//! to it. [`crate::memory::MemoryHost`] is the in-process implementation.

use std::sync::Arc;

use icrc_rpc::{MessageEvent, MessageTarget, WindowId};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::error::RelyingPartyError;

pub const SIGNER_WINDOW_FEATURES: &str =
    "toolbar=no, location=no, directories=no, status=no, menubar=no, scrollbars=yes, resizable=no, copyhistory=no";

pub const DEFAULT_WINDOW_NAME: &str = "signer";

/// A window opened by the relying party.
pub trait Popup: MessageTarget {
    fn id(&self) -> WindowId;
    fn focus(&self);
    fn close(&self);
    fn is_closed(&self) -> bool;
}

/// The window the relying party runs in.
pub trait WindowHost: Send + Sync {
    /// `None` when the host refused to open the window.
    fn open(&self, url: &str, name: &str, features: Option<&str>) -> Option<Arc<dyn Popup>>;

    /// Every message posted to this window from now on.
    fn subscribe(&self) -> broadcast::Receiver<MessageEvent>;

    /// `None` when the host has no screen to place popups on.
    fn geometry(&self) -> Option<ScreenGeometry>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenGeometry {
    pub inner_width: f64,
    pub inner_height: f64,
    pub outer_height: f64,
    pub screen_x: f64,
    pub screen_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowPosition {
    #[default]
    Center,
    TopRight,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowOptions {
    pub position: WindowPosition,
    pub width: u32,
    pub height: u32,
    pub features: String,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self::center()
    }
}

impl WindowOptions {
    pub fn center() -> Self {
        Self {
            position: WindowPosition::Center,
            width: 576,
            height: 625,
            features: SIGNER_WINDOW_FEATURES.to_string(),
        }
    }

    pub fn top_right() -> Self {
        Self {
            position: WindowPosition::TopRight,
            width: 350,
            height: 600,
            features: SIGNER_WINDOW_FEATURES.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), RelyingPartyError> {
        if self.width == 0 || self.height == 0 {
            return Err(RelyingPartyError::invalid_options(format!(
                "window size {}x{} must be positive",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// The feature string handed to the host, with placement computed from
    /// the opener's geometry.
    pub fn features(&self, geometry: Option<ScreenGeometry>) -> Option<String> {
        let geometry = geometry?;
        let width = f64::from(self.width);
        let height = f64::from(self.height);
        let (top, left) = match self.position {
            WindowPosition::Center => (
                geometry.inner_height / 2.0 + geometry.screen_y - height / 2.0,
                geometry.inner_width / 2.0 + geometry.screen_x - width / 2.0,
            ),
            WindowPosition::TopRight => {
                (geometry.outer_height - geometry.inner_height, geometry.inner_width - width)
            }
        };
        Some(format!(
            "{}, width={}, height={}, top={top}, left={left}",
            self.features, self.width, self.height
        ))
    }
}
