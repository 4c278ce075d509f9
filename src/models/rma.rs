use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};
use crate::workflow::Status;

const POSTAL_CODE_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    Repair,
    Calibration,
    Both,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Repair => "REPAIR",
            ServiceType::Calibration => "CALIBRATION",
            ServiceType::Both => "BOTH",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REPAIR" => Ok(ServiceType::Repair),
            "CALIBRATION" => Ok(ServiceType::Calibration),
            "BOTH" => Ok(ServiceType::Both),
            other => Err(AppError::bad_request(format!("unknown service type: {other}"))),
        }
    }
}

/// Reference to a stored document (quote, purchase order)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Evidence {
    #[schema(example = "cotizacion-001.pdf")]
    pub filename: String,
    #[schema(example = "/uploads/2b1c.../cotizacion-001.pdf")]
    pub url: String,
}

impl Evidence {
    pub fn new(filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            url: url.into(),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        !self.filename.trim().is_empty() && !self.url.trim().is_empty()
    }

    fn from_columns(filename: Option<String>, url: Option<String>) -> Option<Self> {
        match (filename, url) {
            (Some(filename), Some(url)) => Some(Self { filename, url }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RmaItem {
    pub id: Uuid,
    pub position: i64,
    pub product_id: Uuid,
    #[schema(example = "SN-99812")]
    pub serial_number: String,
    #[schema(example = "FX-200")]
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation_report: Option<String>,
}

/// One return-authorization case
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Rma {
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(example = "Tech Solutions S.A.")]
    pub company_name: String,
    pub address: String,
    #[schema(example = "06000")]
    pub postal_code: String,
    pub service_type: ServiceType,
    pub items: Vec<RmaItem>,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<Evidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_order: Option<Evidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Rma {
    fn entity_type() -> &'static str {
        "rma"
    }

    fn subject_id(&self) -> Uuid {
        self.id
    }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "rejected" => Severity::Critical,
            "created" => Severity::Important,
            _ => self.severity(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRma {
    pub id: String,
    pub user_id: String,
    pub company_name: String,
    pub address: String,
    pub postal_code: String,
    pub service_type: String,
    pub status: String,
    pub quote_filename: Option<String>,
    pub quote_url: Option<String>,
    pub purchase_order_filename: Option<String>,
    pub purchase_order_url: Option<String>,
    pub rejection_reason: Option<String>,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRmaItem {
    pub id: String,
    pub rma_id: String,
    pub position: i64,
    pub product_id: String,
    pub serial_number: String,
    pub model: String,
    pub evaluation_report: Option<String>,
}

impl TryFrom<DbRmaItem> for RmaItem {
    type Error = AppError;

    fn try_from(value: DbRmaItem) -> Result<Self, Self::Error> {
        Ok(RmaItem {
            id: crate::db::row_parsers::parse_uuid(&value.id)?,
            position: value.position,
            product_id: crate::db::row_parsers::parse_uuid(&value.product_id)?,
            serial_number: value.serial_number,
            model: value.model,
            evaluation_report: value.evaluation_report,
        })
    }
}

impl DbRma {
    /// Assemble the domain record, checking the stored row is consistent
    pub fn into_rma(self, items: Vec<RmaItem>) -> Result<Rma, AppError> {
        use crate::db::row_parsers::parse_uuid;

        let status: Status = self
            .status
            .parse()
            .map_err(|err| AppError::internal(format!("corrupt rma row {}: {err}", self.id)))?;

        if self.rejection_reason.is_some() != (status == Status::Rejected) {
            return Err(AppError::internal(format!(
                "corrupt rma row {}: rejection reason does not match status {status}",
                self.id
            )));
        }

        if items.is_empty() {
            return Err(AppError::internal(format!("corrupt rma row {}: no line items", self.id)));
        }

        Ok(Rma {
            id: parse_uuid(&self.id)?,
            user_id: parse_uuid(&self.user_id)?,
            company_name: self.company_name,
            address: self.address,
            postal_code: self.postal_code,
            service_type: self
                .service_type
                .parse()
                .map_err(|_| AppError::internal(format!("corrupt rma row {}: service type", self.id)))?,
            items,
            status,
            quote: Evidence::from_columns(self.quote_filename, self.quote_url),
            purchase_order: Evidence::from_columns(self.purchase_order_filename, self.purchase_order_url),
            rejection_reason: self.rejection_reason,
            tracking_number: self.tracking_number,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RmaItemRequest {
    #[serde(alias = "productId")]
    pub product_id: Uuid,
    #[serde(alias = "serialNumber")]
    #[schema(example = "SN-99812")]
    pub serial_number: String,
    #[schema(example = "FX-200")]
    pub model: String,
    #[serde(alias = "evaluationReport")]
    pub evaluation_report: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RmaCreateRequest {
    #[serde(alias = "companyName")]
    #[schema(example = "Tech Solutions S.A.")]
    pub company_name: String,
    #[schema(example = "Av. Reforma 123, Col. Centro")]
    pub address: String,
    #[serde(alias = "postalCode")]
    #[schema(example = "06000")]
    pub postal_code: String,
    #[serde(alias = "serviceType")]
    pub service_type: Option<ServiceType>,
    pub items: Vec<RmaItemRequest>,
}

impl RmaCreateRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.company_name.trim().is_empty() {
            return Err(AppError::bad_request("company_name is required"));
        }
        if self.address.trim().is_empty() {
            return Err(AppError::bad_request("address is required"));
        }

        let postal_code = self.postal_code.trim();
        if postal_code.len() != POSTAL_CODE_LEN || !postal_code.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::bad_request(format!(
                "postal_code must have {POSTAL_CODE_LEN} digits"
            )));
        }

        if self.items.is_empty() {
            return Err(AppError::bad_request("at least one item is required"));
        }

        for (index, item) in self.items.iter().enumerate() {
            if item.serial_number.trim().is_empty() {
                return Err(AppError::bad_request(format!("items[{index}].serial_number is required")));
            }
            if item.model.trim().is_empty() {
                return Err(AppError::bad_request(format!("items[{index}].model is required")));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RejectRequest {
    #[serde(alias = "rejectionReason")]
    #[schema(example = "Documentación incompleta")]
    pub rejection_reason: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct InShippingRequest {
    #[serde(alias = "trackingInformation")]
    #[schema(example = "TRK001234567")]
    pub tracking_information: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(deny_unknown_fields)]
pub struct RmaListQuery {
    /// Only RMAs in this status
    pub status: Option<Status>,
    /// Created at or after this instant
    #[serde(alias = "startDate")]
    pub start_date: Option<DateTime<Utc>>,
    /// Created at or before this instant
    #[serde(alias = "endDate")]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusCount {
    pub status: Status,
    pub label: &'static str,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RmaStats {
    pub total: i64,
    pub by_status: Vec<StatusCount>,
}

/// One entry of the audit trail of an RMA
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RmaHistoryEntry {
    pub id: Uuid,
    #[schema(example = "rma.advanced")]
    pub event_name: String,
    pub actor_id: Option<Uuid>,
    pub from_status: Option<Status>,
    pub to_status: Status,
    pub occurred_at: DateTime<Utc>,
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RmaCreateRequest {
        RmaCreateRequest {
            company_name: "Tech Solutions S.A.".into(),
            address: "Av. Reforma 123".into(),
            postal_code: "06000".into(),
            service_type: Some(ServiceType::Repair),
            items: vec![RmaItemRequest {
                product_id: Uuid::new_v4(),
                serial_number: "SN-1".into(),
                model: "FX-200".into(),
                evaluation_report: None,
            }],
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn postal_code_must_be_five_digits() {
        let mut req = request();
        req.postal_code = "0600".into();
        assert!(matches!(req.validate(), Err(AppError::BadRequest(_))));
        req.postal_code = "06a00".into();
        assert!(matches!(req.validate(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn items_are_required_and_complete() {
        let mut req = request();
        req.items.clear();
        assert!(matches!(req.validate(), Err(AppError::BadRequest(_))));

        let mut req = request();
        req.items[0].serial_number = "  ".into();
        assert!(matches!(req.validate(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn db_row_must_keep_rejection_invariant() {
        let now = Utc::now();
        let row = DbRma {
            id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            company_name: "Acme".into(),
            address: "Somewhere 1".into(),
            postal_code: "12345".into(),
            service_type: "BOTH".into(),
            status: "REJECTED".into(),
            quote_filename: None,
            quote_url: None,
            purchase_order_filename: None,
            purchase_order_url: None,
            rejection_reason: None,
            tracking_number: None,
            created_at: now,
            updated_at: now,
        };
        let item = RmaItem {
            id: Uuid::new_v4(),
            position: 0,
            product_id: Uuid::new_v4(),
            serial_number: "SN".into(),
            model: "M".into(),
            evaluation_report: None,
        };

        assert!(row.clone().into_rma(vec![item.clone()]).is_err());

        let mut ok = row;
        ok.rejection_reason = Some("incomplete".into());
        let rma = ok.into_rma(vec![item]).expect("consistent row");
        assert_eq!(rma.status, Status::Rejected);
        assert_eq!(rma.service_type, ServiceType::Both);
    }
}
