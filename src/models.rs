use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::AppError;
use crate::validation::ClientForm;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Names ensured to exist in the staff table on every start.
pub const SEED_STAFF: [&str; 9] = [
    "Ana Júlia", "André", "Italo", "Isabel", "Larissa", "João", "Mateus", "Raissa", "Raul",
];

/// Outcome of a lookup-or-create on a natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Existing(i64),
    Created(i64),
}

impl Registration {
    pub fn id(&self) -> i64 {
        match self {
            Registration::Existing(id) | Registration::Created(id) => *id,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Registration::Created(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Client {
    pub id: i64,
    pub tax_id: String,
    pub requester_name: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientField {
    TaxId,
    RequesterName,
    Phone,
    Email,
}

impl ClientField {
    pub const ALL: [ClientField; 4] = [
        ClientField::TaxId,
        ClientField::RequesterName,
        ClientField::Phone,
        ClientField::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientField::TaxId => "tax_id",
            ClientField::RequesterName => "requester_name",
            ClientField::Phone => "phone",
            ClientField::Email => "email",
        }
    }
}

impl FromStr for ClientField {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        ClientField::ALL
            .into_iter()
            .find(|field| field.as_str() == name)
            .ok_or_else(|| AppError::Validation(format!("Unknown client field: {}", s.trim())))
    }
}

impl fmt::Display for ClientField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Client {
    /// Overwrites one field in memory. Persisting is the caller's job.
    pub fn apply_edit(&mut self, field: ClientField, value: &str) {
        let value = value.trim().to_string();
        match field {
            ClientField::TaxId => self.tax_id = value,
            ClientField::RequesterName => self.requester_name = value,
            ClientField::Phone => self.phone = value,
            ClientField::Email => self.email = value,
        }
    }

    pub fn to_form(&self) -> ClientForm {
        ClientForm {
            tax_id: self.tax_id.clone(),
            requester_name: self.requester_name.clone(),
            phone: self.phone.clone(),
            email: self.email.clone(),
        }
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tax ID: {}, Name: {}, Phone: {}, Email: {}",
            self.tax_id, self.requester_name, self.phone, self.email
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Staff {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Proposal {
    pub id: i64,
    pub client_id: i64,
    pub environmental_authority: String,
    pub process_type: String,
    pub renewal: bool,
    pub document_number: Option<String>,
    pub validity: NaiveDate,
    pub monthly: bool,
    pub responsible_id: Option<i64>,
    pub work_type: Option<String>,
    pub meeting_at: Option<NaiveDateTime>,
    pub delivery_deadline: Option<NaiveDateTime>,
    pub notes: Option<String>,
}

/// Proposal input as typed at the prompt. Dates are still text here.
#[derive(Debug, Clone, Default)]
pub struct NewProposal {
    pub client_id: i64,
    pub environmental_authority: String,
    pub process_type: String,
    pub renewal: bool,
    pub document_number: Option<String>,
    pub validity: String,
    pub monthly: bool,
    pub responsible_id: Option<i64>,
    pub work_type: Option<String>,
    pub meeting_at: Option<String>,
    pub delivery_deadline: Option<String>,
    pub notes: Option<String>,
}

/// A proposal with every field parsed and the renewal rule applied, ready to
/// be written.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalDraft {
    pub client_id: i64,
    pub environmental_authority: String,
    pub process_type: String,
    pub renewal: bool,
    pub document_number: Option<String>,
    pub validity: NaiveDate,
    pub monthly: bool,
    pub responsible_id: Option<i64>,
    pub work_type: Option<String>,
    pub meeting_at: Option<NaiveDateTime>,
    pub delivery_deadline: Option<NaiveDateTime>,
    pub notes: Option<String>,
}

impl TryFrom<NewProposal> for ProposalDraft {
    type Error = AppError;

    fn try_from(input: NewProposal) -> Result<Self, Self::Error> {
        if input.environmental_authority.trim().is_empty() {
            return Err(AppError::Validation(
                "Environmental authority is required".to_string(),
            ));
        }
        if input.process_type.trim().is_empty() {
            return Err(AppError::Validation("Process type is required".to_string()));
        }

        let validity = parse_date("validity", &input.validity)?;
        let meeting_at = parse_optional_date_time("meeting_at", input.meeting_at.as_deref())?;
        let delivery_deadline =
            parse_optional_date_time("delivery_deadline", input.delivery_deadline.as_deref())?;

        let document_number = if input.renewal {
            input.document_number
        } else {
            None
        };

        Ok(Self {
            client_id: input.client_id,
            environmental_authority: input.environmental_authority,
            process_type: input.process_type,
            renewal: input.renewal,
            document_number,
            validity,
            monthly: input.monthly,
            responsible_id: input.responsible_id,
            work_type: input.work_type,
            meeting_at,
            delivery_deadline,
            notes: input.notes,
        })
    }
}

pub fn parse_date(field: &str, text: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).map_err(|e| {
        AppError::Validation(format!(
            "{} must be formatted as YYYY-MM-DD, got '{}': {}",
            field, text, e
        ))
    })
}

/// Blank text counts as absent.
pub fn parse_optional_date_time(
    field: &str,
    text: Option<&str>,
) -> Result<Option<NaiveDateTime>, AppError> {
    match text.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT)
            .map(Some)
            .map_err(|e| {
                AppError::Validation(format!(
                    "{} must be formatted as YYYY-MM-DD HH:MM, got '{}': {}",
                    field, value, e
                ))
            }),
    }
}
