//! Page metadata and the open-session body

use crate::form::Form;
use crate::signals::probe::ProbeReadings;
use serde::{Deserialize, Serialize};

/// Navigator, screen and window geometry as reported by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Environment {
    pub user_agent: String,
    pub cookie_enabled: bool,
    pub language: String,
    pub languages: Vec<String>,
    pub java_enabled: bool,
    pub online: bool,
    /// Minutes behind UTC, as the browser reports it
    pub timezone_offset: i32,
    pub screen_width: u32,
    pub screen_height: u32,
    pub screen_color_depth: u32,
    /// Document client area
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Window inner size
    pub inner_width: u32,
    pub inner_height: u32,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            user_agent: String::new(),
            cookie_enabled: true,
            language: "en-US".to_string(),
            languages: vec!["en-US".to_string()],
            java_enabled: false,
            online: true,
            timezone_offset: 0,
            screen_width: 1920,
            screen_height: 1080,
            screen_color_depth: 24,
            viewport_width: 1920,
            viewport_height: 969,
            inner_width: 1920,
            inner_height: 969,
        }
    }
}

/// Page-level facts sent with the open-session request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub environment: Environment,
    pub location: String,
    pub referrer: String,
    pub title: String,
    pub domain: String,
    pub get_params: String,
    pub total_fields: u32,
    pub hidden_fields: u32,
    pub disabled_fields: u32,
}

impl PageMetadata {
    pub fn capture(environment: &Environment, location: &str, referrer: &str, title: &str, form: &Form) -> Self {
        Self {
            environment: environment.clone(),
            location: location.to_string(),
            referrer: referrer.to_string(),
            title: title.to_string(),
            domain: origin(location),
            get_params: query(location),
            total_fields: form.input_count(),
            hidden_fields: form.hidden_count(),
            disabled_fields: form.disabled_count(),
        }
    }
}

/// `scheme://host[:port]` of a URL, empty when it has no scheme
pub fn origin(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return String::new();
    };
    let authority = rest
        .split(|c: char| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    // drop credentials
    let host = authority.rsplit('@').next().unwrap_or_default();
    format!("{}://{}", scheme.to_ascii_lowercase(), host.to_ascii_lowercase())
}

/// Query string without the leading `?` and without the fragment
pub fn query(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or_default();
    without_fragment
        .split_once('?')
        .map(|(_, q)| q.to_string())
        .unwrap_or_default()
}

/// The open-session request body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signals {
    pub pixel_id: String,
    pub user_agent: String,
    pub cookie_enabled: bool,
    pub current_language: String,
    pub languages: Vec<String>,
    pub java_enabled: bool,
    pub online: bool,
    pub timezone_offset: i32,
    pub screen_height: u32,
    pub screen_width: u32,
    pub screen_color_depth: u32,
    pub location: String,
    pub referrer: String,
    pub page_title: String,
    pub has_hidden_fields: bool,
    pub domain: String,
    pub get_params: String,
    pub view_port_height: u32,
    pub view_port_width: u32,
    // the collector parses this spelling
    #[serde(rename = "avaliableHeight")]
    pub available_height: u32,
    #[serde(rename = "avaliableWidth")]
    pub available_width: u32,
    pub page_total: u32,
    pub disabled_fields: u32,
    pub hidden_fields: u32,
    pub total_fields: u32,
    pub plugin_list: Option<String>,
    pub fonts: Option<Vec<String>>,
    pub canvas: Option<String>,
    pub webgl_vendor: Option<String>,
    pub orientation: Option<String>,
    pub ad_block: Option<bool>,
    #[serde(rename = "hasSS")]
    pub has_ss: Option<bool>,
    #[serde(rename = "hasLS")]
    pub has_ls: Option<bool>,
    #[serde(rename = "hasIDB")]
    pub has_idb: Option<bool>,
    #[serde(rename = "hasODB")]
    pub has_odb: Option<bool>,
}

impl Signals {
    pub fn assemble(pixel_id: &str, page: &PageMetadata, readings: ProbeReadings) -> Self {
        let env = &page.environment;
        Self {
            pixel_id: pixel_id.to_string(),
            user_agent: env.user_agent.clone(),
            cookie_enabled: env.cookie_enabled,
            current_language: env.language.clone(),
            languages: env.languages.clone(),
            java_enabled: env.java_enabled,
            online: env.online,
            timezone_offset: env.timezone_offset,
            screen_height: env.screen_height,
            screen_width: env.screen_width,
            screen_color_depth: env.screen_color_depth,
            location: page.location.clone(),
            referrer: page.referrer.clone(),
            page_title: page.title.clone(),
            has_hidden_fields: page.hidden_fields > 0,
            domain: page.domain.clone(),
            get_params: page.get_params.clone(),
            view_port_height: env.viewport_height,
            view_port_width: env.viewport_width,
            available_height: env.inner_height,
            available_width: env.inner_width,
            page_total: 1,
            disabled_fields: page.disabled_fields,
            hidden_fields: page.hidden_fields,
            total_fields: page.total_fields,
            plugin_list: readings.plugins.map(|p| p.join("; ")),
            fonts: readings.fonts,
            canvas: readings.canvas,
            webgl_vendor: readings.webgl_vendor,
            orientation: readings.orientation,
            ad_block: readings.adblock,
            has_ss: readings.session_storage,
            has_ls: readings.local_storage,
            has_idb: readings.indexed_db,
            has_odb: readings.open_database,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
