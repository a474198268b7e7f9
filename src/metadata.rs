//! Application metadata lookups used to enrich app-scoped entities.

use crate::export::Credentials;
use crate::metrics::AttributeSet;
use dashmap::DashMap;

/// Value exported for app attributes that have not been resolved yet.
pub const PLACEHOLDER: &str = "WAITING ON DATA";

/// Descriptive attribute names, in export order.
pub const APP_INSTANCE_ATTRIBUTES: [&str; 6] = [
    "app.name",
    "app.space.name",
    "app.org.name",
    "app.instances.desired",
    "app.instance.state",
    "app.instance.uid",
];

/// Source of per-application attributes and credentials.
///
/// Implementations must be cheap and safe under high concurrent call volume;
/// they are called on the ingest hot path.
pub trait AppMetadata: Send + Sync {
    /// Descriptive attributes for one app instance. Never fails; unknown
    /// apps get placeholder values.
    fn app_instance_attributes(&self, app_id: &str, instance_index: i32) -> AttributeSet;

    /// Tenant credentials for the app, `None` to use the defaults.
    fn app_credentials(&self, _app_id: &str) -> Option<Credentials> {
        None
    }
}

fn placeholder_attributes() -> AttributeSet {
    APP_INSTANCE_ATTRIBUTES.iter().map(|name| (*name, PLACEHOLDER)).collect()
}

/// Metadata source that knows nothing about any app.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderMetadata;

impl AppMetadata for PlaceholderMetadata {
    fn app_instance_attributes(&self, _app_id: &str, _instance_index: i32) -> AttributeSet {
        placeholder_attributes()
    }
}

/// In-memory metadata cache, filled by whatever resolves apps out of band.
#[derive(Debug, Default)]
pub struct StaticMetadata {
    apps: DashMap<String, AttributeSet>,
    credentials: DashMap<String, Credentials>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the attributes for an app. Names not supplied fall back to placeholders.
    pub fn insert_app(&self, app_id: impl Into<String>, attributes: AttributeSet) {
        let mut merged = attributes;
        merged.append_all(&placeholder_attributes());
        self.apps.insert(app_id.into(), merged);
    }

    pub fn insert_credentials(&self, app_id: impl Into<String>, credentials: Credentials) {
        self.credentials.insert(app_id.into(), credentials);
    }
}

impl AppMetadata for StaticMetadata {
    fn app_instance_attributes(&self, app_id: &str, _instance_index: i32) -> AttributeSet {
        match self.apps.get(app_id) {
            Some(attrs) => attrs.value().clone(),
            None => placeholder_attributes(),
        }
    }

    fn app_credentials(&self, app_id: &str) -> Option<Credentials> {
        self.credentials.get(app_id).map(|c| c.value().clone())
    }
}
