//! Sample letters and service-year tips
//!
//! A fixed catalogue; nothing here touches the store.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Letter,
    Tip,
}

impl FromStr for ResourceKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "letter" | "letters" => Ok(ResourceKind::Letter),
            "tip" | "tips" => Ok(ResourceKind::Tip),
            other => Err(ServiceError::Validation(format!(
                "Unknown resource kind '{}': expected letters or tips",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub content: &'static str,
}

/// A resource rendered as a downloadable text file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub filename: String,
    pub content_type: &'static str,
    pub body: String,
}

static LETTERS: &[Resource] = &[
    Resource {
        id: "1",
        title: "PPA Request Letter",
        description: "Template for requesting a Primary Place of Assignment",
        kind: ResourceKind::Letter,
        content: "[Your Name]
[Your State Code]
[Your Batch]
[Date]

The Director,
[PPA Name],
[PPA Address],
[City, State].

Dear Sir/Ma,

REQUEST FOR PRIMARY PLACE OF ASSIGNMENT

I am writing to request for a Primary Place of Assignment (PPA) in your organization. I am a corps member currently serving in [State] and I am interested in contributing my skills and knowledge to your organization.

I have attached my credentials and I am available for an interview at your convenience.

Thank you for your consideration.

Yours faithfully,
[Your Name]
[Your State Code]",
    },
    Resource {
        id: "2",
        title: "Leave of Absence Letter",
        description: "Template for requesting leave of absence",
        kind: ResourceKind::Letter,
        content: "[Your Name]
[Your State Code]
[Your Batch]
[Date]

The State Coordinator,
NYSC [State] Secretariat,
[Address].

Dear Sir/Ma,

REQUEST FOR LEAVE OF ABSENCE

I am writing to request for a leave of absence from [Start Date] to [End Date] due to [Reason].

I have made necessary arrangements to ensure my duties are covered during this period.

Thank you for your consideration.

Yours faithfully,
[Your Name]
[Your State Code]",
    },
];

static TIPS: &[Resource] = &[
    Resource {
        id: "1",
        title: "Accommodation Tips",
        description: "Essential tips for finding and securing accommodation during service",
        kind: ResourceKind::Tip,
        content: "1. Start your search early, at least 2-3 weeks before resuming at your PPA
2. Consider security and proximity to your PPA
3. Negotiate rent prices and payment terms
4. Get a written agreement
5. Take photos of the property before moving in
6. Keep receipts of all payments
7. Consider sharing with other corps members to reduce costs
8. Check for basic amenities (water, electricity, security)
9. Verify the landlord's ownership of the property
10. Keep your state coordinator informed of your address",
    },
    Resource {
        id: "2",
        title: "Clearance Tips",
        description: "Important tips for successful clearance",
        kind: ResourceKind::Tip,
        content: "1. Keep all your documents organized
2. Make copies of important documents
3. Start clearance process early
4. Follow up regularly with relevant offices
5. Keep track of all signatures and stamps
6. Maintain a good relationship with your PPA supervisor
7. Attend all mandatory programs
8. Keep your call-up letter and other original documents safe
9. Take photos of all clearance documents
10. Stay in touch with your state coordinator",
    },
];

/// Every resource of a kind, in display order
pub fn catalogue(kind: ResourceKind) -> &'static [Resource] {
    match kind {
        ResourceKind::Letter => LETTERS,
        ResourceKind::Tip => TIPS,
    }
}

pub fn find(kind: ResourceKind, id: &str) -> ServiceResult<&'static Resource> {
    catalogue(kind)
        .iter()
        .find(|r| r.id == id)
        .ok_or_else(|| ServiceError::NotFound(format!("{:?} resource {}", kind, id).to_lowercase()))
}

/// Render a resource as `<title>.txt`
pub fn download(kind: ResourceKind, id: &str) -> ServiceResult<Download> {
    let resource = find(kind, id)?;
    Ok(Download {
        filename: format!("{}.txt", resource.title),
        content_type: "text/plain; charset=utf-8",
        body: resource.content.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue() {
        assert_eq!(catalogue(ResourceKind::Letter).len(), 2);
        assert!(catalogue(ResourceKind::Tip)
            .iter()
            .all(|r| r.kind == ResourceKind::Tip));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("letters".parse::<ResourceKind>().unwrap(), ResourceKind::Letter);
        assert_eq!("Tip".parse::<ResourceKind>().unwrap(), ResourceKind::Tip);
        assert!("videos".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_download() {
        let file = download(ResourceKind::Tip, "2").unwrap();
        assert_eq!(file.filename, "Clearance Tips.txt");
        assert!(file.content_type.starts_with("text/plain"));
        assert!(file.body.starts_with("1. Keep all your documents organized"));

        assert!(matches!(
            download(ResourceKind::Letter, "9"),
            Err(ServiceError::NotFound(_))
        ));
    }
}
