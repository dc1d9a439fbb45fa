use async_trait::async_trait;
use serde::Serialize;

use crate::db::models::{DonationRequest, Organization};

/// Contact fields a prospective donor needs to reach an NGO. A straight
/// projection of the profile; fields absent there are absent here.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ContactBundle {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
}

/// Build the contact bundle for an offer. Callers must have resolved the
/// organization first; an unresolved profile blocks the offer action.
pub fn prepare_offer(request: &DonationRequest, organization: &Organization) -> ContactBundle {
    tracing::debug!(
        "Preparing offer contact for request {} ({})",
        request.id,
        request.medicine_name
    );
    ContactBundle {
        email: organization.contact_email.clone(),
        phone: organization.contact_phone.clone(),
        website: organization.website.clone(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutreachInput {
    pub organization_name: String,
    pub medicine_name: String,
}

/// External text-generation collaborator. No retry contract is assumed;
/// callers layer their own fallback.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, input: &OutreachInput) -> anyhow::Result<String>;
}

/// Draft an outreach message for a donor to send. Drafting is best-effort:
/// a failure returns `None` and the contact bundle is still shown.
pub async fn draft_outreach_message(
    generator: &dyn TextGenerator,
    organization_name: &str,
    medicine_name: &str,
) -> Option<String> {
    let input = OutreachInput {
        organization_name: organization_name.to_string(),
        medicine_name: medicine_name.to_string(),
    };
    match generator.generate(&input).await {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!("Outreach drafting failed for {}: {}", organization_name, e);
            None
        }
    }
}

fn outreach_prompt(input: &OutreachInput) -> String {
    format!(
        "Write a short, polite message to the NGO \"{}\" from a donor who can \
         supply the medicine \"{}\" they requested. Greet the organization, \
         reference the medicine by name, state the intent to help, ask about \
         next steps, and close politely.",
        input.organization_name, input.medicine_name
    )
}

/// Deterministic local drafting. Used in development when no generation
/// service is configured, and as the test stub.
pub struct TemplateGenerator;

#[async_trait]
impl TextGenerator for TemplateGenerator {
    async fn generate(&self, input: &OutreachInput) -> anyhow::Result<String> {
        Ok(format!(
            "Dear {},\n\nI saw your request for {} and I would like to help. \
             Could you let me know the next steps for arranging the donation?\n\n\
             Kind regards",
            input.organization_name, input.medicine_name
        ))
    }
}

/// Client for a hosted text-generation service.
pub struct HttpTextGenerator {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpTextGenerator {
    pub fn new(url: String, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()?;
        Ok(HttpTextGenerator { client, url, api_key })
    }
}

#[derive(serde::Deserialize)]
struct GenerationResponse {
    text: String,
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, input: &OutreachInput) -> anyhow::Result<String> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "prompt": outreach_prompt(input) }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(anyhow::anyhow!("generation service status {}", resp.status()));
        }

        let body: GenerationResponse = resp.json().await?;
        Ok(body.text)
    }
}

/// Select the drafting backend from the environment, mirroring the store
/// selection: hosted service when configured, local template otherwise.
pub fn init_text_generator() -> anyhow::Result<std::sync::Arc<dyn TextGenerator>> {
    match std::env::var("TEXTGEN_URL") {
        Ok(url) => {
            let api_key = std::env::var("TEXTGEN_API_KEY")
                .map_err(|_| anyhow::anyhow!("TEXTGEN_API_KEY must be set with TEXTGEN_URL"))?;
            Ok(std::sync::Arc::new(HttpTextGenerator::new(url, api_key)?))
        }
        Err(_) => {
            tracing::warn!("TEXTGEN_URL not set; using local outreach template");
            Ok(std::sync::Arc::new(TemplateGenerator))
        }
    }
}
