use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::Json,
};
use json_patch::Patch;
use prescription_engine::auth::{CallerIdentity, ROLE_ATTRIBUTE};
use prescription_engine::codec;
use prescription_engine::models::{
    AnalyticsReport, DateRange, DispenseRecord, DispenseRequest, DoctorPrescriptionView,
    ExpiryOutcome, HistoryEntry, PatientRecord, Prescription, PrescriptionStatus, RevokeRequest,
};
use prescription_engine::{EngineError, LedgerGateway, LedgerStore, PrescriptionContract};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::AppState;

pub const CALLER_ID_HEADER: &str = "x-caller-id";
pub const CALLER_ORG_HEADER: &str = "x-caller-org";
pub const CALLER_ROLE_HEADER: &str = "x-caller-role";

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InteractionParams {
    medication: Option<String>,
}

/// Builds the caller identity from the already-verified identity headers.
/// Absent headers stay empty so the guard reports what is missing.
pub fn caller_identity(headers: &HeaderMap) -> CallerIdentity {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    let identity = CallerIdentity::new(
        text(CALLER_ID_HEADER).unwrap_or_default(),
        text(CALLER_ORG_HEADER).unwrap_or_default(),
    );
    match text(CALLER_ROLE_HEADER) {
        Some(role) => identity.with_attribute(ROLE_ATTRIBUTE, role),
        None => identity,
    }
}

fn required_param(field: &str, value: Option<String>) -> Result<String, EngineError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| EngineError::validation(field, format!("{} is required", field)))
}

/// Re-reads a prescription inside the session that just wrote it.
async fn prescription_after<L: LedgerGateway>(
    contract: &PrescriptionContract,
    session: &mut L,
    patient_id: &str,
    prescription_id: &str,
) -> Result<Json<Prescription>, ApiError> {
    let record = contract.read_asset(session, patient_id).await?;
    let prescription = record
        .prescription(prescription_id)
        .cloned()
        .ok_or_else(|| EngineError::prescription_not_found(prescription_id))?;
    Ok(Json(prescription))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn create_or_merge_asset<S: LedgerStore>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<(StatusCode, [(HeaderName, String); 1], Json<PatientRecord>), ApiError> {
    let incoming: PatientRecord = codec::parse_payload("patient record", &body)?;
    let patient_id = incoming.patient_id.clone();

    let mut session = state.store.open_session();
    state
        .contract
        .create_or_merge_asset(&mut session, incoming)
        .await?;
    let record = state.contract.read_asset(&mut session, &patient_id).await?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/patients/{}", patient_id))],
        Json(record),
    ))
}

pub async fn batch_create_prescriptions<S: LedgerStore>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let records: Vec<PatientRecord> = codec::parse_payload("batch payload", &body)?;
    let count = records.len();

    let mut session = state.store.open_session();
    state
        .contract
        .batch_create_prescriptions(&mut session, records)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "created": count, "txId": session.tx_id() })),
    ))
}

pub async fn read_asset<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(patient_id): Path<String>,
) -> Result<Json<PatientRecord>, ApiError> {
    let mut session = state.store.open_session();
    let record = state.contract.read_asset(&mut session, &patient_id).await?;
    Ok(Json(record))
}

pub async fn update_prescription<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path((patient_id, prescription_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Prescription>, ApiError> {
    let mut prescription: Prescription = codec::parse_payload("prescription", &body)?;
    if prescription.prescription_id.is_empty() {
        prescription.prescription_id = prescription_id.clone();
    } else if prescription.prescription_id != prescription_id {
        return Err(EngineError::validation(
            "PrescriptionId",
            "prescription id in the body does not match the path",
        )
        .into());
    }

    let mut session = state.store.open_session();
    state
        .contract
        .update_prescription(&mut session, &patient_id, prescription)
        .await?;
    prescription_after(&state.contract, &mut session, &patient_id, &prescription_id).await
}

/// Applies a JSON Patch to the stored prescription and submits the result as
/// a full replacement.
pub async fn patch_prescription<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path((patient_id, prescription_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Prescription>, ApiError> {
    let patch: Patch = codec::parse_payload("patch document", &body)?;

    let mut session = state.store.open_session();
    let record = state.contract.read_asset(&mut session, &patient_id).await?;
    let stored = record
        .prescription(&prescription_id)
        .ok_or_else(|| EngineError::prescription_not_found(&prescription_id))?;

    let mut value = serde_json::to_value(stored).map_err(|source| EngineError::Parse {
        subject: "prescription",
        source,
    })?;
    json_patch::patch(&mut value, &patch).map_err(ApiError::invalid_patch)?;
    let patched: Prescription =
        serde_json::from_value(value).map_err(|source| EngineError::Parse {
            subject: "patched prescription",
            source,
        })?;

    if patched.prescription_id != prescription_id {
        return Err(
            EngineError::validation("PrescriptionId", "prescription id cannot be changed").into(),
        );
    }

    state
        .contract
        .update_prescription(&mut session, &patient_id, patched)
        .await?;
    prescription_after(&state.contract, &mut session, &patient_id, &prescription_id).await
}

pub async fn dispense_prescription<S: LedgerStore>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<Json<Prescription>, ApiError> {
    let request: DispenseRequest = codec::parse_payload("dispense request", &body)?;
    let (patient_id, prescription_id) =
        (request.patient_id.clone(), request.prescription_id.clone());

    let mut session = state.store.open_session();
    state
        .contract
        .dispense_prescription(&mut session, request)
        .await?;
    prescription_after(&state.contract, &mut session, &patient_id, &prescription_id).await
}

pub async fn revoke_prescription<S: LedgerStore>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<Json<Prescription>, ApiError> {
    let request: RevokeRequest = codec::parse_payload("revoke request", &body)?;
    let (patient_id, prescription_id) =
        (request.patient_id.clone(), request.prescription_id.clone());

    let mut session = state.store.open_session();
    state
        .contract
        .revoke_prescription(&mut session, request)
        .await?;
    prescription_after(&state.contract, &mut session, &patient_id, &prescription_id).await
}

pub async fn get_asset_history<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(patient_id): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let mut session = state.store.open_session();
    let history = state
        .contract
        .get_asset_history(&mut session, &patient_id)
        .await?;
    Ok(Json(history))
}

pub async fn get_prescriptions_by_status<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(patient_id): Path<String>,
    Query(params): Query<StatusParams>,
) -> Result<Json<Vec<Prescription>>, ApiError> {
    let status: PrescriptionStatus = required_param("status", params.status)?.parse()?;

    let mut session = state.store.open_session();
    let prescriptions = state
        .contract
        .get_prescriptions_by_status(&mut session, &patient_id, status)
        .await?;
    Ok(Json(prescriptions))
}

pub async fn get_prescriptions_by_patient_for_doctor<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(patient_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PatientRecord>, ApiError> {
    let identity = caller_identity(&headers);

    let mut session = state.store.open_session();
    let record = state
        .contract
        .get_prescriptions_by_patient_for_doctor(&mut session, &identity, &patient_id)
        .await?;
    Ok(Json(record))
}

pub async fn check_prescription_expiry<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path((patient_id, prescription_id)): Path<(String, String)>,
) -> Result<Json<ExpiryOutcome>, ApiError> {
    let mut session = state.store.open_session();
    let outcome = state
        .contract
        .check_prescription_expiry(&mut session, &patient_id, &prescription_id)
        .await?;
    Ok(Json(outcome))
}

pub async fn check_medication_interactions<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(patient_id): Path<String>,
    Query(params): Query<InteractionParams>,
) -> Result<Json<Vec<String>>, ApiError> {
    let medication = required_param("medication", params.medication)?;

    let mut session = state.store.open_session();
    let warnings = state
        .contract
        .check_medication_interactions(&mut session, &patient_id, &medication)
        .await?;
    Ok(Json(warnings))
}

pub async fn get_prescription_analytics<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Query(range): Query<DateRange>,
) -> Result<Json<AnalyticsReport>, ApiError> {
    let mut session = state.store.open_session();
    let report = state
        .contract
        .get_prescription_analytics(&mut session, &range)
        .await?;
    Ok(Json(report))
}

pub async fn get_prescriptions_by_doctor<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Vec<DoctorPrescriptionView>>, ApiError> {
    let mut session = state.store.open_session();
    let views = state
        .contract
        .get_prescriptions_by_doctor(&mut session, &doctor_id)
        .await?;
    Ok(Json(views))
}

pub async fn get_dispense_history<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(pharmacist_id): Path<String>,
) -> Result<Json<Vec<DispenseRecord>>, ApiError> {
    let mut session = state.store.open_session();
    let records = state
        .contract
        .get_dispense_history(&mut session, &pharmacist_id)
        .await?;
    Ok(Json(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use prescription_engine::auth::{AuthorizationGuard, IdentityContext, Role, DOCTOR_ORG};

    #[test]
    fn test_caller_identity_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CALLER_ID_HEADER, HeaderValue::from_static("D1"));
        headers.insert(CALLER_ORG_HEADER, HeaderValue::from_static(DOCTOR_ORG));
        headers.insert(CALLER_ROLE_HEADER, HeaderValue::from_static("doctor"));

        let identity = caller_identity(&headers);
        assert_eq!(identity.caller_id(), "D1");
        assert_eq!(identity.caller_attribute(ROLE_ATTRIBUTE), Some("doctor"));
        assert_eq!(
            AuthorizationGuard::default().resolve_caller(&identity).unwrap(),
            Role::Doctor
        );
    }

    #[test]
    fn test_missing_role_header_leaves_attribute_unset() {
        let mut headers = HeaderMap::new();
        headers.insert(CALLER_ID_HEADER, HeaderValue::from_static("D1"));
        headers.insert(CALLER_ORG_HEADER, HeaderValue::from_static(DOCTOR_ORG));

        let identity = caller_identity(&headers);
        assert_eq!(identity.caller_attribute(ROLE_ATTRIBUTE), None);
        let err = AuthorizationGuard::default()
            .resolve_caller(&identity)
            .unwrap_err();
        assert!(err.to_string().contains("role attribute not found"));
    }

    #[test]
    fn test_required_param_rejects_blank() {
        assert!(required_param("medication", Some("  ".to_string())).is_err());
        assert!(required_param("medication", None).is_err());
        assert_eq!(
            required_param("medication", Some("Aspirin".to_string())).unwrap(),
            "Aspirin"
        );
    }
}
