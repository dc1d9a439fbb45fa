use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    High,
    Medium,
    Low,
}

impl Urgency {
    /// Ordering weight: High sorts first.
    pub fn rank(self) -> u8 {
        match self {
            Urgency::High => 0,
            Urgency::Medium => 1,
            Urgency::Low => 2,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Open,
    Fulfilled,
    Closed,
}

impl RequestStatus {
    /// Fulfilled and Closed are terminal; there is no reopening.
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Fulfilled | RequestStatus::Closed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Open => "Open",
            RequestStatus::Fulfilled => "Fulfilled",
            RequestStatus::Closed => "Closed",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgType {
    Hospital,
    Clinic,
    Pharmacy,
    ReliefAgency,
    CommunityHealth,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DonationRequest {
    pub id: String,
    pub ngo_id: String,
    // Denormalized so listings render without a profile fetch.
    pub ngo_name: String,
    pub medicine_name: String,
    pub description: String,
    pub quantity_needed: u32,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub org_type: OrgType,
    pub address: String,
    pub city: String,
    pub description: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub website: Option<String>,
    pub services: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ImpactStory {
    pub id: String,
    pub ngo_id: String,
    pub ngo_name: String,
    pub title: String,
    pub story_content: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}
