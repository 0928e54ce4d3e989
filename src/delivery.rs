use crate::config::RelaySettings;
use crate::errors::{AppError, AppResult};
use crate::models::{ClientMeta, Language, NewMessage};
use crate::tracker::AnalyticsTracker;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::time::Duration;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    MissingFields,
    InvalidEmail,
}

impl ValidationError {
    pub fn message(self, language: Language) -> &'static str {
        match (self, language) {
            (Self::MissingFields, Language::Pt) => "Por favor, preencha todos os campos.",
            (Self::MissingFields, Language::En) => "Please fill in all fields.",
            (Self::InvalidEmail, Language::Pt) => "Por favor, insira um email válido.",
            (Self::InvalidEmail, Language::En) => "Please enter a valid email address.",
        }
    }
}

pub fn validate_submission(submission: &NewMessage) -> Result<(), ValidationError> {
    let fields = [
        &submission.name,
        &submission.email,
        &submission.subject,
        &submission.message,
    ];
    if fields.iter().any(|field| field.trim().is_empty()) {
        return Err(ValidationError::MissingFields);
    }
    if !EMAIL_PATTERN.is_match(submission.email.trim()) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelayResponse {
    pub status: u16,
    pub body: Option<serde_json::Value>,
}

impl RelayResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    // 2xx with `"success": false` is still a rejection.
    pub fn accepted(&self) -> bool {
        self.is_success()
            && self
                .body
                .as_ref()
                .and_then(|body| body.get("success"))
                .map(|flag| !matches!(flag, serde_json::Value::Bool(false)) && flag != "false")
                .unwrap_or(true)
    }
}

pub trait RelayTransport: Send + Sync {
    fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> impl Future<Output = AppResult<RelayResponse>> + Send;

    fn post_form(
        &self,
        url: &str,
        fields: &[(&str, &str)],
    ) -> impl Future<Output = AppResult<RelayResponse>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: reqwest::Client,
}

impl HttpRelay {
    pub fn new(timeout_ms: u64) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self { client })
    }
}

impl RelayTransport for HttpRelay {
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> AppResult<RelayResponse> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.json::<serde_json::Value>().await.ok();
        Ok(RelayResponse { status, body })
    }

    async fn post_form(&self, url: &str, fields: &[(&str, &str)]) -> AppResult<RelayResponse> {
        let response = self.client.post(url).form(fields).send().await?;
        Ok(RelayResponse {
            status: response.status().as_u16(),
            body: None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryOutcome {
    Relayed,
    Activated,
    MailClient,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub message_id: String,
    pub outcome: DeliveryOutcome,
    pub status_message: String,
    pub mailto: String,
}

impl DeliveryReport {
    pub fn delivered(&self) -> bool {
        !matches!(self.outcome, DeliveryOutcome::MailClient)
    }
}

fn status_message(outcome: DeliveryOutcome, language: Language) -> &'static str {
    match (outcome, language) {
        (DeliveryOutcome::Relayed, Language::Pt) => "Mensagem enviada com sucesso! Responderemos em breve.",
        (DeliveryOutcome::Relayed, Language::En) => "Message sent successfully! We will get back to you soon.",
        (DeliveryOutcome::Activated, Language::Pt) => "Sistema ativado! Tente enviar novamente em alguns minutos.",
        (DeliveryOutcome::Activated, Language::En) => "System activated! Please try sending again in a few minutes.",
        (DeliveryOutcome::MailClient, Language::Pt) => {
            "Cliente de email aberto. Por favor, envie a mensagem manualmente."
        }
        (DeliveryOutcome::MailClient, Language::En) => "Email client opened. Please send the message manually.",
    }
}

pub fn mailto_link(relay: &RelaySettings, submission: &NewMessage, language: Language) -> String {
    let (name_label, subject_label, message_label) = match language {
        Language::Pt => ("Nome", "Assunto", "Mensagem"),
        Language::En => ("Name", "Subject", "Message"),
    };
    let subject = format!("{} {}", relay.subject_prefix, submission.subject);
    let body = format!(
        "{}: {}\nEmail: {}\n{}: {}\n\n{}:\n{}",
        name_label,
        submission.name,
        submission.email,
        subject_label,
        submission.subject,
        message_label,
        submission.message
    );
    format!(
        "mailto:{}?subject={}&body={}",
        relay.recipient_email,
        urlencoding::encode(&subject),
        urlencoding::encode(&body)
    )
}

pub struct ContactDelivery<'a, T: RelayTransport> {
    tracker: &'a AnalyticsTracker,
    transport: T,
    relay: RelaySettings,
    language: Language,
}

impl<'a, T: RelayTransport> ContactDelivery<'a, T> {
    pub fn new(tracker: &'a AnalyticsTracker, transport: T, relay: RelaySettings, language: Language) -> Self {
        Self {
            tracker,
            transport,
            relay,
            language,
        }
    }

    pub async fn submit(&self, submission: NewMessage, client_meta: ClientMeta) -> AppResult<DeliveryReport> {
        validate_submission(&submission)
            .map_err(|error| AppError::Validation(error.message(self.language).to_string()))?;

        let mailto = mailto_link(&self.relay, &submission, self.language);
        let message_id = self.tracker.record_message(submission.clone(), client_meta);

        let outcome = if self.try_relay(&submission).await {
            DeliveryOutcome::Relayed
        } else if self.try_activation().await {
            DeliveryOutcome::Activated
        } else {
            DeliveryOutcome::MailClient
        };
        tracing::info!(message_id = %message_id, outcome = ?outcome, "contact submission handled");

        Ok(DeliveryReport {
            message_id,
            outcome,
            status_message: status_message(outcome, self.language).to_string(),
            mailto,
        })
    }

    async fn try_relay(&self, submission: &NewMessage) -> bool {
        let payload = json!({
            "name": submission.name,
            "email": submission.email,
            "subject": submission.subject,
            "message": submission.message,
            "_subject": format!("{} {}", self.relay.subject_prefix, submission.subject),
            "_template": "box",
            "_captcha": false,
            "_replyto": submission.email,
        });
        match self.transport.post_json(&self.relay.endpoint(), &payload).await {
            Ok(response) if response.accepted() => true,
            Ok(response) => {
                tracing::warn!(status = response.status, "relay rejected submission");
                false
            }
            Err(error) => {
                tracing::warn!(error = %error, "relay request failed");
                false
            }
        }
    }

    async fn try_activation(&self) -> bool {
        let subject = format!("{} relay activation", self.relay.subject_prefix);
        let fields = [
            ("name", "Automatic activation"),
            ("email", self.relay.activation_sender.as_str()),
            ("message", "Automatic activation of the contact form relay."),
            ("_subject", subject.as_str()),
        ];
        match self
            .transport
            .post_form(&self.relay.activation_endpoint(), &fields)
            .await
        {
            Ok(response) => response.is_success(),
            Err(error) => {
                tracing::warn!(error = %error, "relay activation failed");
                false
            }
        }
    }
}
