//! Widget commands and events.
//!
//! This module defines the messages exchanged between a host page and the
//! consent widget.
//!
//! # Main Types
//!
//! - [`WidgetCommand`]: input from the host (page lifecycle, user input, server triggers).
//! - [`WidgetEvent`]: notifications from the widget (state changes, banner and toast
//!   changes, recorded decisions, diagnostics).

use crate::engine::banner::{BannerState, ControlKind};
use crate::engine::cookies::ConsentDecision;
use crate::engine::dom::NodeId;
use crate::engine::status::ConsentStatus;
use crate::engine::toast::ToastId;
use std::collections::BTreeMap;

/// Commands that can be sent to the widget
#[derive(Clone, Debug, PartialEq)]
pub enum WidgetCommand {
    // ****************************************
    // ** Page lifecycle
    /// The page finished loading; start the banner lifecycle
    PageReady,
    /// Check again and fetch the banner, even with auto loading off
    LoadBanner,
    /// The page goes away. Removes all toasts and stops the worker
    Unload,

    // ****************************************
    // ** User input
    /// Element clicked
    Click { target: NodeId },
    /// Checkbox toggled
    Change { target: NodeId, checked: bool },

    // ****************************************
    // ** Server events
    /// Raw `HX-Trigger` header of a fragment-swap response
    ServerTrigger { header: String },

    // ****************************************
    // ** Toasts
    /// Show a plain toast
    ShowToast { message: String, title: Option<String> },
    /// Show the toast found in a server rendered fragment
    InjectToast { html: String },
    /// Remove a toast before its time
    DismissToast(ToastId),

    // ****************************************
    // ** Status
    /// Ask the server for the current consent status
    RefreshStatus,
}

/// Events emitted by the widget
#[derive(Clone, Debug, PartialEq)]
pub enum WidgetEvent {
    /// The banner lifecycle moved to another state
    StateChanged { from: BannerState, to: BannerState },
    /// A banner was mounted; `html` is its sanitized markup
    BannerMounted {
        node: NodeId,
        html: String,
        controls: Vec<(NodeId, ControlKind)>,
    },
    /// The banner (or its slot) was removed from the page
    BannerRemoved,
    /// The decision cookie was written
    DecisionRecorded { decision: ConsentDecision },
    /// Granular preferences were saved by the server
    PreferencesSaved { preferences: BTreeMap<String, bool> },
    /// A toast was shown
    ToastShown { id: ToastId, message: String },
    /// A toast was removed
    ToastRemoved { id: ToastId },
    /// Status query answered
    StatusLoaded { status: ConsentStatus },
    /// The page was unloaded
    Unloaded,
    /// Something went wrong but the widget carried on
    Warning { message: String },
}
