//! End-to-end scenarios against `Facade::dispatch`, exercising the full
//! JSON wire shape rather than the typed façade methods directly (those are
//! covered by the in-module tests). Mirrors the scenarios this protocol is
//! meant to survive (spec §8): happy-path pairing through data phase, a
//! wrong pairing token, and reset clearing both sessions and identity.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use pp_core::kv::test_util::InMemoryKv;
use pp_core::{Config, Facade, KvStore};
use serde_json::json;

fn b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn b64_decode(s: &str) -> Vec<u8> {
    STANDARD.decode(s).unwrap()
}

fn new_facade() -> Facade {
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());
    Facade::new(kv, Config { native_messaging_enabled: true })
}

#[tokio::test]
async fn happy_path_pairing_handshake_and_data_phase() {
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());
    let identity = Arc::new(pp_core::IdentityStore::new(kv.clone()));
    let pairing = pp_core::PairingManager::new(kv.clone(), identity.clone());
    let facade = Facade::new(kv, Config { native_messaging_enabled: true });

    let code = pairing.pairing_code().await;
    let ext = pp_crypto::ed_keypair();
    let ext_b64 = b64(&ext.public);

    let identity_resp = facade
        .dispatch("getAppIdentity", json!({"pairing_token": code, "peer_ed_pub_b64": ext_b64}))
        .await
        .unwrap();
    assert!(identity_resp.get("fingerprint").is_some());

    pairing.confirm_peer(&ext_b64).await.unwrap();

    let ext_x = pp_crypto::x_keypair();
    let begin = facade
        .dispatch("beginHandshake", json!({"ext_eph_pub_b64": b64(&ext_x.public)}))
        .await
        .unwrap();
    let session_id = begin["session_id"].as_str().unwrap().to_string();
    let host_eph_pub = b64_decode(begin["host_eph_pub_b64"].as_str().unwrap());

    let mut transcript = Vec::new();
    transcript.extend_from_slice(&host_eph_pub);
    transcript.extend_from_slice(&ext_x.public);
    transcript.extend_from_slice(&ext.public);
    let mut client_transcript = Vec::new();
    client_transcript.extend_from_slice(b"pearpass/client-finish/v1");
    client_transcript.extend_from_slice(session_id.as_bytes());
    client_transcript.extend_from_slice(&transcript);
    let client_sig = pp_crypto::ed_sign(&ext.secret, &client_transcript).unwrap();

    let finish = facade
        .dispatch("finishHandshake", json!({"session_id": session_id, "client_sig_b64": b64(&client_sig)}))
        .await
        .unwrap();
    assert_eq!(finish["ok"], true);

    let sealed = facade
        .dispatch("seal", json!({"session_id": session_id, "plaintext_b64": b64(b"vault-unlocked")}))
        .await
        .unwrap();

    let opened = facade
        .dispatch(
            "open",
            json!({
                "session_id": session_id,
                "nonce_b64": sealed["nonce_b64"],
                "ciphertext_b64": sealed["ciphertext_b64"],
                "seq": sealed["seq"],
            }),
        )
        .await
        .unwrap();
    let plaintext = b64_decode(opened["plaintext_b64"].as_str().unwrap());
    assert_eq!(plaintext, b"vault-unlocked");

    // Replaying the same sealed frame must be rejected.
    let replay = facade
        .dispatch(
            "open",
            json!({
                "session_id": session_id,
                "nonce_b64": sealed["nonce_b64"],
                "ciphertext_b64": sealed["ciphertext_b64"],
                "seq": sealed["seq"],
            }),
        )
        .await;
    assert_eq!(replay.unwrap_err().kind, pp_proto::ErrorKind::ReplayDetected);
}

#[tokio::test]
async fn wrong_pairing_token_is_rejected() {
    let facade = new_facade();
    let ext = pp_crypto::ed_keypair();
    let result = facade
        .dispatch("getAppIdentity", json!({"pairing_token": "000000-0000", "peer_ed_pub_b64": b64(&ext.public)}))
        .await;
    assert_eq!(result.unwrap_err().kind, pp_proto::ErrorKind::InvalidPairingToken);
}

#[tokio::test]
async fn second_peer_is_rejected_while_first_is_pinned() {
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());
    let identity = Arc::new(pp_core::IdentityStore::new(kv.clone()));
    let pairing = pp_core::PairingManager::new(kv.clone(), identity);
    let facade = Facade::new(kv, Config { native_messaging_enabled: true });

    let code = pairing.pairing_code().await;
    let peer_a = pp_crypto::ed_keypair();
    let peer_b = pp_crypto::ed_keypair();

    facade
        .dispatch("getAppIdentity", json!({"pairing_token": code.clone(), "peer_ed_pub_b64": b64(&peer_a.public)}))
        .await
        .unwrap();

    let result = facade
        .dispatch("getAppIdentity", json!({"pairing_token": code, "peer_ed_pub_b64": b64(&peer_b.public)}))
        .await;
    assert_eq!(result.unwrap_err().kind, pp_proto::ErrorKind::PeerAlreadyPaired);
}

#[tokio::test]
async fn bad_client_signature_is_rejected_and_closes_the_session() {
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());
    let identity = Arc::new(pp_core::IdentityStore::new(kv.clone()));
    let pairing = pp_core::PairingManager::new(kv.clone(), identity);
    let facade = Facade::new(kv, Config { native_messaging_enabled: true });

    let code = pairing.pairing_code().await;
    let ext = pp_crypto::ed_keypair();
    facade
        .dispatch("getAppIdentity", json!({"pairing_token": code, "peer_ed_pub_b64": b64(&ext.public)}))
        .await
        .unwrap();
    pairing.confirm_peer(&b64(&ext.public)).await.unwrap();

    let ext_x = pp_crypto::x_keypair();
    let begin = facade
        .dispatch("beginHandshake", json!({"ext_eph_pub_b64": b64(&ext_x.public)}))
        .await
        .unwrap();
    let session_id = begin["session_id"].as_str().unwrap().to_string();

    let bogus_sig = b64(&[0u8; 64]);
    let result = facade
        .dispatch("finishHandshake", json!({"session_id": session_id, "client_sig_b64": bogus_sig}))
        .await;
    assert_eq!(result.unwrap_err().kind, pp_proto::ErrorKind::PeerSignatureInvalid);

    let after = facade.dispatch("closeSession", json!({"session_id": session_id})).await.unwrap();
    assert_eq!(after["ok"], false, "session must already be gone after a failed finish");
}

#[tokio::test]
async fn reset_pairing_clears_sessions_and_mints_new_identity() {
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());
    let identity = Arc::new(pp_core::IdentityStore::new(kv.clone()));
    let pairing = pp_core::PairingManager::new(kv.clone(), identity.clone());
    let facade = Facade::new(kv, Config { native_messaging_enabled: true });

    let before = identity.get_or_create().await;
    let code = pairing.pairing_code().await;
    let ext = pp_crypto::ed_keypair();
    facade
        .dispatch("getAppIdentity", json!({"pairing_token": code, "peer_ed_pub_b64": b64(&ext.public)}))
        .await
        .unwrap();

    let reset = facade.dispatch("resetPairing", json!({})).await.unwrap();
    assert_eq!(reset["ok"], true);

    let status = facade
        .dispatch("checkPairingStatus", json!({"peer_ed_pub_b64": b64(&ext.public)}))
        .await
        .unwrap();
    assert_eq!(status["paired"], false);

    let after = identity.get_or_create().await;
    assert_ne!(before.ed_pub, after.ed_pub, "reset must mint a different identity");
}
