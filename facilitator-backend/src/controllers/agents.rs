//! Agent registration API
//!
//! Called after the payment for a registration has settled.

use actix_web::{web, HttpResponse, Responder};
use facilitator_types::{
    AgentLookupQuery, ApiResponse, RegisterAgentRequest, RegisterAgentResponse, RegistrationStatus,
};
use tokio_util::sync::CancellationToken;

use super::{bad_request, not_found, ok};
use crate::domain_types::{lowercase_hex, parse_address};
use crate::eip8004::{
    DelegationAuthorization, MetadataEntry, RegistrarError, RegistrationIntent, RegistrationOutcome,
    RegistrationRequest,
};
use crate::AppState;

pub fn config_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/agents/register").route(web::post().to(register_agent)));
    cfg.service(web::resource("/api/agents/{address}").route(web::get().to(get_agent)));
}

async fn register_agent(state: web::Data<AppState>, body: web::Json<RegisterAgentRequest>) -> impl Responder {
    let body = body.into_inner();

    let agent_address = match parse_address(&body.agent_address) {
        Ok(a) => a,
        Err(e) => return bad_request(format!("Invalid agentAddress: {}", e)),
    };

    let authorization: DelegationAuthorization = match serde_json::from_value(body.authorization) {
        Ok(a) => a,
        Err(e) => return bad_request(format!("Invalid authorization: {}", e)),
    };

    let metadata = match body
        .metadata
        .iter()
        .map(|m| MetadataEntry::from_input(&m.key, &m.value))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(m) => m,
        Err(e) => return bad_request(e),
    };

    let request = RegistrationRequest {
        agent_address,
        authorization,
        intent: RegistrationIntent::from_parts(body.token_uri, metadata),
        network: body.network,
    };

    // Dropping the handler (client went away) cancels the receipt wait
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    match state.registrar.register(request, &cancel).await {
        Ok(outcome) => ok(outcome_response(&state, agent_address, outcome)),
        Err(e) => registrar_error_response(&e),
    }
}

fn outcome_response(
    state: &AppState,
    agent_address: ethers::types::Address,
    outcome: RegistrationOutcome,
) -> RegisterAgentResponse {
    let agent_id = outcome.agent_id().map(|id| id.to_string());
    match outcome {
        RegistrationOutcome::AlreadyRegistered(record) => RegisterAgentResponse {
            status: RegistrationStatus::AlreadyRegistered,
            agent_address: record.agent_address.to_lowercase_hex(),
            agent_id,
            agent_id_source: None,
            chain_id: record.chain_id,
            explorer_url: state
                .networks
                .get(record.chain_id)
                .ok()
                .and_then(|n| n.tx_url(&record.transaction_hash)),
            transaction_hash: record.transaction_hash,
            diagnostics: Vec::new(),
        },
        RegistrationOutcome::Confirmed {
            chain_id,
            transaction_hash,
            agent_id_source,
            diagnostics,
            ..
        } => {
            let transaction_hash = format!("{:?}", transaction_hash);
            RegisterAgentResponse {
                status: RegistrationStatus::Registered,
                agent_address: lowercase_hex(&agent_address),
                agent_id,
                agent_id_source: agent_id_source.map(|s| s.as_str().to_string()),
                chain_id,
                explorer_url: state
                    .networks
                    .get(chain_id)
                    .ok()
                    .and_then(|n| n.tx_url(&transaction_hash)),
                transaction_hash,
                diagnostics: diagnostics.iter().map(|d| d.to_string()).collect(),
            }
        }
    }
}

fn registrar_error_response(e: &RegistrarError) -> HttpResponse {
    log::error!("[agents] Registration failed: {}", e);
    let body = ApiResponse::<()>::err(e.to_string());
    match e {
        RegistrarError::Configuration(_) | RegistrarError::Delegation(_) => {
            HttpResponse::BadRequest().json(body)
        }
        RegistrarError::Reverted { .. } => HttpResponse::UnprocessableEntity().json(body),
        RegistrarError::ConfirmationFailed { .. } => HttpResponse::GatewayTimeout().json(body),
        RegistrarError::Chain(_) => HttpResponse::BadGateway().json(body),
    }
}

async fn get_agent(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<AgentLookupQuery>,
) -> impl Responder {
    let address = match parse_address(&path.into_inner()) {
        Ok(a) => a,
        Err(e) => return bad_request(e),
    };
    let chain_id = query.chain_id.unwrap_or(state.config.default_chain_id);

    match state.ledger.registration(chain_id, &address).await {
        Some(record) => ok(record),
        None => not_found(format!(
            "{} is not registered on chain {}",
            lowercase_hex(&address),
            chain_id
        )),
    }
}
