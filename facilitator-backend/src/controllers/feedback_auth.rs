//! Feedback authorization API
//!
//! Issuance reads the agent's on-chain owner first: the token is always
//! signed as that owner, remotely (resource origin) or with the local key.

use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use ethers::types::{Address, Bytes, U256};
use facilitator_types::{ApiResponse, DecodeFeedbackAuthRequest, DecodedFeedbackAuth, IssueFeedbackAuthRequest};
use std::sync::Arc;

use super::{bad_request, not_found, ok};
use crate::domain_types::{lowercase_hex, parse_address, parse_uint256};
use crate::eip8004::abi::{decode_owner_of, encode_owner_of};
use crate::eip8004::{FeedbackAuthError, FeedbackAuthRecord, FeedbackAuthRequest, FeedbackAuthorizationToken};
use crate::wallet::{RemoteSigner, WalletProvider};
use crate::AppState;

pub fn config_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/feedback-auth").route(web::post().to(issue_feedback_auth)));
    cfg.service(web::resource("/api/feedback-auth/decode").route(web::post().to(decode_feedback_auth)));
    cfg.service(web::resource("/api/feedback-auth/{client}").route(web::get().to(get_feedback_auth)));
}

async fn issue_feedback_auth(
    state: web::Data<AppState>,
    body: web::Json<IssueFeedbackAuthRequest>,
) -> impl Responder {
    let body = body.into_inner();

    let agent_id = match parse_uint256(&body.agent_id) {
        Ok(id) => id,
        Err(e) => return bad_request(format!("Invalid agentId: {}", e)),
    };
    let client_address = match parse_address(&body.client_address) {
        Ok(a) => a,
        Err(e) => return bad_request(format!("Invalid clientAddress: {}", e)),
    };
    let chain_id = body.chain_id.unwrap_or(state.config.default_chain_id);

    let owner = match read_owner(&state, chain_id, agent_id).await {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };

    let remote_signer: Option<Arc<dyn WalletProvider>> = match body.resource.as_deref() {
        Some(resource) => {
            match RemoteSigner::for_resource(resource, &state.config.remote_signer_path, &lowercase_hex(&owner)) {
                Ok(signer) => {
                    log::debug!("[feedback_auth] Remote signer at {}", signer.endpoint());
                    Some(Arc::new(signer) as Arc<dyn WalletProvider>)
                }
                Err(e) => return bad_request(e),
            }
        }
        None => None,
    };

    let issued = match state
        .feedback_issuer
        .issue(FeedbackAuthRequest {
            agent_id,
            client_address,
            signer_address: owner,
            chain_id,
            index_limit: body.index_limit,
            expiry: body.expiry.map(U256::from),
            remote_signer,
        })
        .await
    {
        Ok(issued) => issued,
        Err(e) => return issuer_error_response(&e),
    };

    let fields = issued.token.fields;
    let record = FeedbackAuthRecord {
        agent_id: fields.agent_id.into(),
        client_address: fields.client_address.into(),
        index_limit: fields.index_limit,
        expiry: fields.expiry.into(),
        chain_id: fields.chain_id.into(),
        identity_registry: fields.identity_registry.into(),
        signer_address: fields.signer_address.into(),
        feedback_auth: issued.token.to_hex(),
        signed_by: issued.signed_by.to_string(),
        issued_at: Utc::now(),
    };
    state.ledger.store_feedback_auth(&record).await;

    ok(record)
}

/// `ownerOf(agentId)` on the chain's identity registry
async fn read_owner(state: &AppState, chain_id: u64, agent_id: U256) -> Result<Address, HttpResponse> {
    let registry = state
        .networks
        .identity_registry(chain_id)
        .map_err(|e| bad_request(e.to_string()))?;
    let adapter = state
        .chains
        .adapter_for(chain_id)
        .map_err(|e| HttpResponse::BadGateway().json(ApiResponse::<()>::err(e)))?;

    let returned = adapter
        .call_contract_read(registry, Bytes::from(encode_owner_of(agent_id)))
        .await
        .map_err(|e| {
            log::warn!("[feedback_auth] ownerOf({}) failed on chain {}: {}", agent_id, chain_id, e);
            HttpResponse::BadGateway().json(ApiResponse::<()>::err(format!("ownerOf failed: {}", e)))
        })?;

    let owner = decode_owner_of(returned.as_ref())
        .map_err(|e| HttpResponse::BadGateway().json(ApiResponse::<()>::err(e)))?;
    if owner.is_zero() {
        return Err(not_found(format!("Agent {} has no owner on chain {}", agent_id, chain_id)));
    }
    Ok(owner)
}

fn issuer_error_response(e: &FeedbackAuthError) -> HttpResponse {
    log::error!("[feedback_auth] Issuance failed: {}", e);
    let body = ApiResponse::<()>::err(e.to_string());
    match e {
        FeedbackAuthError::UnconfiguredRegistry { .. } => HttpResponse::BadRequest().json(body),
        FeedbackAuthError::SignerUnavailable => HttpResponse::ServiceUnavailable().json(body),
        FeedbackAuthError::RemoteSignFailed { .. } => HttpResponse::BadGateway().json(body),
    }
}

async fn get_feedback_auth(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let client = match parse_address(&path.into_inner()) {
        Ok(a) => a,
        Err(e) => return bad_request(e),
    };

    match state.ledger.feedback_auth(&client).await {
        Some(record) => ok(record),
        None => not_found(format!("No feedback authorization for {}", lowercase_hex(&client))),
    }
}

async fn decode_feedback_auth(body: web::Json<DecodeFeedbackAuthRequest>) -> impl Responder {
    let token = match FeedbackAuthorizationToken::decode_hex(&body.feedback_auth) {
        Ok(token) => token,
        Err(e) => return bad_request(e),
    };
    let recovered = match token.recover_signer() {
        Ok(a) => a,
        Err(e) => return bad_request(e),
    };

    let fields = token.fields;
    let now = Utc::now().timestamp().max(0) as u64;
    ok(DecodedFeedbackAuth {
        agent_id: fields.agent_id.to_string(),
        client_address: lowercase_hex(&fields.client_address),
        index_limit: fields.index_limit,
        expiry: fields.expiry.to_string(),
        chain_id: fields.chain_id.to_string(),
        identity_registry: lowercase_hex(&fields.identity_registry),
        signer_address: lowercase_hex(&fields.signer_address),
        struct_hash: format!("{:?}", token.struct_hash),
        recovered_signer: lowercase_hex(&recovered),
        signature_valid: recovered == fields.signer_address,
        expired: token.is_expired_at(now),
    })
}
