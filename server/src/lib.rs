//! HTTP surface over the prescription engine.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;

use axum::{
    routing::{get, post, put},
    Router,
};
use prescription_engine::{LedgerStore, PrescriptionContract};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state: where sessions come from and the rules applied to them.
pub struct AppState<S> {
    pub store: S,
    pub contract: Arc<PrescriptionContract>,
}

impl<S: LedgerStore> AppState<S> {
    pub fn new(store: S, contract: PrescriptionContract) -> Self {
        Self {
            store,
            contract: Arc::new(contract),
        }
    }
}

impl<S: Clone> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            contract: Arc::clone(&self.contract),
        }
    }
}

pub fn app<S: LedgerStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/patients", post(handlers::create_or_merge_asset::<S>))
        .route("/batch", post(handlers::batch_create_prescriptions::<S>))
        .route("/patients/:patient_id", get(handlers::read_asset::<S>))
        .route(
            "/patients/:patient_id/history",
            get(handlers::get_asset_history::<S>),
        )
        .route(
            "/patients/:patient_id/prescriptions",
            get(handlers::get_prescriptions_by_status::<S>),
        )
        .route(
            "/patients/:patient_id/prescriptions/:prescription_id",
            put(handlers::update_prescription::<S>).patch(handlers::patch_prescription::<S>),
        )
        .route(
            "/patients/:patient_id/prescriptions/:prescription_id/expiry",
            post(handlers::check_prescription_expiry::<S>),
        )
        .route(
            "/patients/:patient_id/my-prescriptions",
            get(handlers::get_prescriptions_by_patient_for_doctor::<S>),
        )
        .route(
            "/patients/:patient_id/interactions",
            get(handlers::check_medication_interactions::<S>),
        )
        .route("/dispense", post(handlers::dispense_prescription::<S>))
        .route("/revoke", post(handlers::revoke_prescription::<S>))
        .route("/analytics", get(handlers::get_prescription_analytics::<S>))
        .route(
            "/doctors/:doctor_id/prescriptions",
            get(handlers::get_prescriptions_by_doctor::<S>),
        )
        .route(
            "/pharmacists/:pharmacist_id/dispenses",
            get(handlers::get_dispense_history::<S>),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
