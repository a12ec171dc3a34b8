use actix_web::{web, HttpResponse, Responder};

use crate::AppState;

/// Version from Cargo.toml, available at compile time
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn config_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/health").route(web::get().to(health_check)));
    cfg.service(web::resource("/api/health/config").route(web::get().to(get_config_status)));
}

async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": VERSION
    }))
}

async fn get_config_status(state: web::Data<AppState>) -> impl Responder {
    let gas_payer = state.gas_payer.as_ref().map(|w| {
        serde_json::json!({
            "address": w.get_address(),
            "mode": w.mode_name()
        })
    });
    let owner_signer = state.owner_signer.as_ref().map(|w| w.get_address());

    let networks: Vec<serde_json::Value> = state
        .networks
        .chain_ids()
        .into_iter()
        .filter_map(|id| state.networks.get(id).ok())
        .map(|n| {
            serde_json::json!({
                "chain_id": n.chain_id,
                "name": n.name,
                "identity_registry": n.identity_registry,
                "agent_registry": n.agent_registry_string(),
                "delegate_configured": n.delegate_contract.is_some()
            })
        })
        .collect();

    HttpResponse::Ok().json(serde_json::json!({
        "gas_payer": gas_payer,
        "local_feedback_signer": owner_signer,
        "remote_signer_path": state.config.remote_signer_path,
        "default_chain_id": state.config.default_chain_id,
        "store_backend": state.store_backend,
        "networks": networks
    }))
}
