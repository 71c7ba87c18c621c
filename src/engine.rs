pub mod banner;
pub mod config;
pub mod cookies;
pub mod dom;
pub mod errors;
pub mod events;
pub mod handle;
pub mod net;
pub mod preferences;
pub mod sanitizer;
pub mod status;
pub mod tick;
pub mod toast;
pub mod triggers;
pub mod widget;
pub mod worker;

pub use banner::{BannerState, ControlKind};
pub use config::{resolve_config, resolve_config_json, ConfigOverride, WidgetConfig, WidgetConfigBuilder};
pub use cookies::{ConsentDecision, CookieJar, DefaultCookieJar};
pub use dom::{Document, NodeId};
pub use errors::{ConfigError, NetError, WidgetError};
pub use events::{WidgetCommand, WidgetEvent};
pub use handle::WidgetHandle;
pub use net::{ReqwestTransport, Transport};
pub use tick::TickResult;
pub use toast::{ToastHost, ToastId};
pub use widget::ConsentWidget;
pub use worker::WidgetWorker;
