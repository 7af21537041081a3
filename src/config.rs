//! Configuration types.
//!
//! Everything is read once at startup and then shared read-only. Each
//! `from_env` constructor is a thin wrapper over `from_lookup`, which takes
//! a key → value closure so tests can feed a map instead of touching the
//! process environment.

use std::net::SocketAddr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default body ceiling: 15 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 15 * 1024 * 1024;

/// Default number of attachments accepted per submission.
pub const DEFAULT_MAX_ATTACHMENTS: usize = 10;

/// Tag whose submissions are mirrored into the workflow system.
pub const LEGAL_TAG: &str = "legal";

/// Top-level relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    pub max_body_bytes: usize,
    pub rate_limit_per_minute: u32,
    /// Take the client address from `X-Forwarded-For`/`X-Real-IP`.
    /// Only safe behind a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
    pub http_timeout: Duration,
    pub submission: SubmissionPolicy,
    pub recipients: RecipientConfig,
    pub bot_check: Option<BotCheckConfig>,
    pub mail: MailConfig,
    pub workflow: Option<WorkflowConfig>,
}

/// Rules applied by the normalizer.
#[derive(Debug, Clone)]
pub struct SubmissionPolicy {
    /// Maximum attachments per submission.
    pub max_attachments: usize,
    /// Reject submissions whose message is blank.
    pub require_message: bool,
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        Self {
            max_attachments: DEFAULT_MAX_ATTACHMENTS,
            require_message: true,
        }
    }
}

/// Recipient allow-list.
#[derive(Debug, Clone)]
pub struct RecipientConfig {
    /// Tags a submitter may choose.
    pub allowed: Vec<String>,
    /// Suffix appended to a tag to form its mailbox, e.g. `@example.org`.
    pub email_domain: String,
    /// Mailbox for the `legal` tag.
    pub legal_mailbox: String,
}

impl Default for RecipientConfig {
    fn default() -> Self {
        let email_domain = "@ethereum.org".to_string();
        Self {
            allowed: vec!["legal".into(), "devcon".into(), "security".into()],
            legal_mailbox: format!("{LEGAL_TAG}{email_domain}"),
            email_domain,
        }
    }
}

/// Supported bot-check providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCheckProvider {
    Turnstile,
    Recaptcha,
}

impl BotCheckProvider {
    /// Provider verification endpoint.
    pub fn verify_url(self) -> &'static str {
        match self {
            Self::Turnstile => "https://challenges.cloudflare.com/turnstile/v0/siteverify",
            Self::Recaptcha => "https://www.google.com/recaptcha/api/siteverify",
        }
    }

    /// Form field the browser widget posts its token in.
    pub fn token_field(self) -> &'static str {
        match self {
            Self::Turnstile => "cf-turnstile-response",
            Self::Recaptcha => "g-recaptcha-response",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Turnstile => "turnstile",
            Self::Recaptcha => "recaptcha",
        }
    }
}

/// Bot-check configuration. Absent means bot-check is disabled.
#[derive(Debug, Clone)]
pub struct BotCheckConfig {
    pub provider: BotCheckProvider,
    pub secret_key: SecretString,
    /// Scores below this are treated as failures.
    pub min_score: f64,
    /// Override for the provider endpoint.
    pub verify_url: String,
}

/// Outbound mail backends.
#[derive(Debug, Clone)]
pub enum MailBackend {
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: SecretString,
    },
    SendGrid {
        api_key: SecretString,
        api_url: String,
    },
}

/// Outbound mail configuration.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub from_address: String,
    pub backend: MailBackend,
}

/// Workflow (Kissflow) integration settings. Absent disables the notifier.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub base_url: String,
    pub process_id: String,
    pub access_key_id: String,
    pub access_key_secret: SecretString,
    pub page_size: u32,
    pub max_pages: u32,
    /// Field names that may hold the grant/request number, probed in order.
    pub reference_fields: Vec<String>,
    pub comments_field: String,
}

/// Candidate grant-id field names, in probe order.
pub const DEFAULT_REFERENCE_FIELDS: &[&str] = &[
    "Grant_ID",
    "Grant_Id",
    "GrantID",
    "Grant_Number",
    "Request_Number",
    "Reference_ID",
];

impl RelayConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = parse_or(&get, "RELAY_BIND_ADDR", "0.0.0.0:8080".parse().ok())?;
        let max_body_bytes = parse_or(&get, "RELAY_MAX_BODY_BYTES", Some(DEFAULT_MAX_BODY_BYTES))?;
        let rate_limit_per_minute = parse_or(&get, "RELAY_RATE_LIMIT_PER_MINUTE", Some(10))?;
        let trust_proxy_headers = parse_bool(&get, "RELAY_TRUST_PROXY_HEADERS", false)?;
        let http_timeout =
            Duration::from_secs(parse_or(&get, "RELAY_HTTP_TIMEOUT_SECS", Some(10u64))?);

        let submission = SubmissionPolicy {
            max_attachments: parse_or(
                &get,
                "RELAY_MAX_ATTACHMENTS",
                Some(DEFAULT_MAX_ATTACHMENTS),
            )?,
            require_message: parse_bool(&get, "RELAY_REQUIRE_MESSAGE", true)?,
        };

        let defaults = RecipientConfig::default();
        let allowed = get("RELAY_RECIPIENTS")
            .map(|s| split_list(&s))
            .unwrap_or(defaults.allowed);
        if allowed.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_RECIPIENTS".into(),
                message: "allow-list must not be empty".into(),
            });
        }
        let email_domain = get("RELAY_EMAIL_DOMAIN").unwrap_or(defaults.email_domain);
        let legal_mailbox =
            get("RELAY_LEGAL_MAILBOX").unwrap_or_else(|| format!("{LEGAL_TAG}{email_domain}"));
        let recipients = RecipientConfig {
            allowed,
            email_domain,
            legal_mailbox,
        };

        Ok(Self {
            bind_addr,
            max_body_bytes,
            rate_limit_per_minute,
            trust_proxy_headers,
            http_timeout,
            submission,
            recipients,
            bot_check: bot_check_from(&get)?,
            mail: mail_from(&get)?,
            workflow: workflow_from(&get)?,
        })
    }
}

fn bot_check_from<G>(get: &G) -> Result<Option<BotCheckConfig>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(provider) = get("BOT_CHECK_PROVIDER") else {
        return Ok(None);
    };
    let provider = match provider.to_ascii_lowercase().as_str() {
        "turnstile" => BotCheckProvider::Turnstile,
        "recaptcha" => BotCheckProvider::Recaptcha,
        other => {
            return Err(ConfigError::InvalidValue {
                key: "BOT_CHECK_PROVIDER".into(),
                message: format!("unknown provider '{other}' (expected turnstile or recaptcha)"),
            });
        }
    };
    let secret_key = get("BOT_CHECK_SECRET_KEY").ok_or_else(|| ConfigError::MissingRequired {
        key: "BOT_CHECK_SECRET_KEY".into(),
        hint: "Set it to the provider's secret key or unset BOT_CHECK_PROVIDER.".into(),
    })?;
    let min_score = parse_or(get, "BOT_CHECK_MIN_SCORE", Some(0.5_f64))?;
    if !(0.0..=1.0).contains(&min_score) {
        return Err(ConfigError::InvalidValue {
            key: "BOT_CHECK_MIN_SCORE".into(),
            message: format!("{min_score} is outside 0.0..=1.0"),
        });
    }

    Ok(Some(BotCheckConfig {
        provider,
        secret_key: SecretString::from(secret_key),
        min_score,
        verify_url: get("BOT_CHECK_VERIFY_URL").unwrap_or_else(|| provider.verify_url().into()),
    }))
}

fn mail_from<G>(get: &G) -> Result<MailConfig, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let from_address = get("MAIL_FROM_ADDRESS")
        .ok_or_else(|| ConfigError::MissingEnvVar("MAIL_FROM_ADDRESS".into()))?;

    let backend = match get("MAIL_BACKEND")
        .unwrap_or_else(|| "smtp".into())
        .to_ascii_lowercase()
        .as_str()
    {
        "smtp" => MailBackend::Smtp {
            host: get("SMTP_HOST").ok_or_else(|| ConfigError::MissingEnvVar("SMTP_HOST".into()))?,
            port: parse_or(get, "SMTP_PORT", Some(587))?,
            username: get("SMTP_USERNAME").unwrap_or_default(),
            password: SecretString::from(get("SMTP_PASSWORD").unwrap_or_default()),
        },
        "sendgrid" => MailBackend::SendGrid {
            api_key: SecretString::from(
                get("SENDGRID_API_KEY")
                    .ok_or_else(|| ConfigError::MissingEnvVar("SENDGRID_API_KEY".into()))?,
            ),
            api_url: get("SENDGRID_API_URL")
                .unwrap_or_else(|| "https://api.sendgrid.com/v3/mail/send".into()),
        },
        other => {
            return Err(ConfigError::InvalidValue {
                key: "MAIL_BACKEND".into(),
                message: format!("unknown backend '{other}' (expected smtp or sendgrid)"),
            });
        }
    };

    Ok(MailConfig {
        from_address,
        backend,
    })
}

fn workflow_from<G>(get: &G) -> Result<Option<WorkflowConfig>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(access_key_id) = get("KISSFLOW_ACCESS_KEY_ID") else {
        return Ok(None);
    };
    let require = |key: &str| {
        get(key).ok_or_else(|| ConfigError::MissingRequired {
            key: key.into(),
            hint: "All KISSFLOW_* variables are required once KISSFLOW_ACCESS_KEY_ID is set."
                .into(),
        })
    };
    let access_key_secret = SecretString::from(require("KISSFLOW_ACCESS_KEY_SECRET")?);
    let account_id = require("KISSFLOW_ACCOUNT_ID")?;
    let process_id = require("KISSFLOW_PROCESS_ID")?;
    let base_url = match get("KISSFLOW_BASE_URL") {
        Some(url) => url,
        None => {
            let subdomain = require("KISSFLOW_SUBDOMAIN")?;
            format!("https://{subdomain}.kissflow.com/process/2/{account_id}")
        }
    };

    let page_size = parse_or(get, "KISSFLOW_PAGE_SIZE", Some(100u32))?;
    let max_pages = parse_or(get, "KISSFLOW_MAX_PAGES", Some(100u32))?;
    if page_size == 0 || max_pages == 0 {
        return Err(ConfigError::InvalidValue {
            key: "KISSFLOW_PAGE_SIZE/KISSFLOW_MAX_PAGES".into(),
            message: "must be greater than zero".into(),
        });
    }

    Ok(Some(WorkflowConfig {
        base_url: base_url.trim_end_matches('/').to_string(),
        process_id,
        access_key_id,
        access_key_secret,
        page_size,
        max_pages,
        reference_fields: get("KISSFLOW_REFERENCE_FIELDS")
            .map(|s| split_list(&s))
            .unwrap_or_else(|| DEFAULT_REFERENCE_FIELDS.iter().map(|s| s.to_string()).collect()),
        comments_field: get("KISSFLOW_COMMENTS_FIELD").unwrap_or_else(|| "KYC_Comments".into()),
    }))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<G, T>(get: &G, key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.into(),
            message: e.to_string(),
        }),
        None => default.ok_or_else(|| ConfigError::MissingEnvVar(key.into())),
    }
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("'{v}' is not a boolean"),
        }),
    }
}
