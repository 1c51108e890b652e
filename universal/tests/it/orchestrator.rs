use std::sync::Arc;

use alloy::primitives::Bytes;
use num_bigint::BigUint;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use universal::{
    Error,
    account::UniversalAccount,
    address::Encoding,
    cfg::Config,
    network::{NetworkError, QueryFilter, QueryScope, SignedEnvelope, Transaction, TxHandle},
    orchestrator::{AppMessage, ExecuteParams},
    schema::{Field, FieldKind, MessageSchema, SchemaError, SchemaRegistry},
    signer::{SignerAdapter, recover_address},
};

use crate::{
    DecliningSigner, MockNetwork, orchestrator, random_evm_account, random_hex_address,
    random_signer,
};

fn chat_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            "CHAT:MESSAGE",
            MessageSchema::new(
                "chat.message",
                vec![
                    Field::required("text", FieldKind::String),
                    Field::optional("tip", FieldKind::Integer),
                ],
            ),
        )
        .unwrap();
    registry
}

#[universal_macros::test]
async fn execute_signs_and_submits(mut rng: ChaCha8Rng) {
    let network = MockNetwork::new();
    let orchestrator = orchestrator(network.clone(), SchemaRegistry::new());
    let (signer, adapter) = random_signer(&mut rng);

    let target = random_hex_address(&mut rng);
    let data = Bytes::copy_from_slice(&rng.r#gen::<[u8; 16]>());
    let params = ExecuteParams {
        target: target.clone(),
        value: Some(BigUint::from(10u32).pow(21)),
        data: Some(data.clone()),
        message: None,
    };
    let handle = orchestrator.execute(params, &adapter, None).await.unwrap();

    let sent = network.sent();
    assert_eq!(sent.len(), 1);
    let (recipients, envelope) = &sent[0];
    assert!(recipients.is_empty());
    assert_eq!(envelope.category, "UNIVERSAL:EXECUTE");
    assert_eq!(&envelope.signer, adapter.account());
    assert_eq!(
        recover_address(&envelope.data, &envelope.signature).unwrap(),
        signer.address()
    );

    // The transaction is sent from the signer's derived wallet.
    let chain = orchestrator.config().chain();
    let wallet = orchestrator
        .deriver()
        .resolve_owner(adapter.account())
        .unwrap();
    assert_eq!(envelope.from, wallet.target_account(&chain));

    let result = orchestrator
        .query(&QueryFilter::new(QueryScope::Account(envelope.from.clone())))
        .await
        .unwrap();
    let tx = result.transactions().next().unwrap();
    assert_eq!(tx.hash, handle);
    let decoded = orchestrator.decode_message(tx).unwrap();
    assert_eq!(
        decoded,
        ExecuteParams {
            target,
            value: Some(BigUint::from(10u32).pow(21)),
            data: Some(data),
            message: None,
        }
    );
}

#[universal_macros::test]
async fn target_may_use_either_encoding(mut rng: ChaCha8Rng) {
    let network = MockNetwork::new();
    let orchestrator = orchestrator(network.clone(), SchemaRegistry::new());
    let (_, adapter) = random_signer(&mut rng);

    let codec = Config::default().address_codec().unwrap();
    let hex = random_hex_address(&mut rng);
    let bech32 = codec
        .to_native_encoding(&hex, Encoding::Hex, Encoding::Bech32)
        .unwrap();
    for target in [hex.to_lowercase(), bech32] {
        let params = ExecuteParams {
            target,
            ..Default::default()
        };
        orchestrator.execute(params, &adapter, None).await.unwrap();
    }

    // Both spellings produce the same signed payload.
    let sent = network.sent();
    assert_eq!(sent[0].1.data, sent[1].1.data);
    let decoded = orchestrator
        .decode_message(&as_transaction(&sent[0].1))
        .unwrap();
    assert_eq!(decoded.target, hex);
    assert_eq!(decoded.value, Some(BigUint::from(0u8)));
    assert_eq!(decoded.data, Some(Bytes::new()));
}

#[universal_macros::test]
async fn invalid_target_is_a_validation_error(mut rng: ChaCha8Rng) {
    let network = MockNetwork::new();
    let orchestrator = orchestrator(network.clone(), SchemaRegistry::new());
    let (_, adapter) = random_signer(&mut rng);

    for target in ["0xABCDEF", "", "cosmos1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqnrql8a"] {
        let params = ExecuteParams {
            target: target.to_owned(),
            ..Default::default()
        };
        let err = orchestrator.execute(params, &adapter, None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{target}: {err}");
        assert!(!err.is_retry_safe());
    }
    assert!(network.sent().is_empty());
}

#[universal_macros::test]
async fn failed_recipient_aborts_the_whole_call(mut rng: ChaCha8Rng) {
    let network = MockNetwork::new();
    let orchestrator = orchestrator(network.clone(), SchemaRegistry::new());
    // Signing would fail too, but recipients are resolved first.
    let adapter = SignerAdapter::new(random_evm_account(&mut rng), Arc::new(DecliningSigner));

    let recipients = [
        random_evm_account(&mut rng),
        UniversalAccount::new("eip155", "1", "0xABCDEF"),
        random_evm_account(&mut rng),
    ];
    let params = ExecuteParams {
        target: random_hex_address(&mut rng),
        ..Default::default()
    };
    let err = orchestrator
        .execute(params, &adapter, Some(&recipients))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Derivation(_)), "{err}");
    assert!(network.sent().is_empty());
}

#[universal_macros::test]
async fn recipients_resolve_to_target_chain_accounts(mut rng: ChaCha8Rng) {
    let network = MockNetwork::new();
    let orchestrator = orchestrator(network.clone(), SchemaRegistry::new());
    let chain = orchestrator.config().chain();

    // A signer native to the target chain sends from its own account.
    let (signer, _) = random_signer(&mut rng);
    let native = chain.account(signer.address().to_checksum(None));
    let adapter = SignerAdapter::new(native.clone(), Arc::new(signer));

    let external = random_evm_account(&mut rng);
    let solana = UniversalAccount::new(
        "solana",
        "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp",
        bs58::encode(rng.r#gen::<[u8; 32]>()).into_string(),
    );
    let local = chain.account(random_hex_address(&mut rng));
    let params = ExecuteParams {
        target: random_hex_address(&mut rng),
        ..Default::default()
    };
    orchestrator
        .execute(
            params,
            &adapter,
            Some(&[external.clone(), solana.clone(), local.clone()]),
        )
        .await
        .unwrap();

    let deriver = orchestrator.deriver();
    let sent = network.sent();
    let (recipients, envelope) = &sent[0];
    assert_eq!(envelope.from, native);
    assert_eq!(
        recipients,
        &vec![
            deriver.resolve_owner(&external).unwrap().target_account(&chain),
            deriver.resolve_owner(&solana).unwrap().target_account(&chain),
            local,
        ]
    );
}

#[universal_macros::test]
async fn native_accounts_are_normalized(mut rng: ChaCha8Rng) {
    let network = MockNetwork::new();
    let orchestrator = orchestrator(network.clone(), SchemaRegistry::new());
    let chain = orchestrator.config().chain();
    let (_, adapter) = random_signer(&mut rng);

    let codec = Config::default().address_codec().unwrap();
    let checksummed = random_hex_address(&mut rng);
    let bech32 = codec
        .to_native_encoding(&checksummed, Encoding::Hex, Encoding::Bech32)
        .unwrap();
    for spelling in [checksummed.clone(), checksummed.to_lowercase(), bech32] {
        let params = ExecuteParams {
            target: random_hex_address(&mut rng),
            ..Default::default()
        };
        let recipient = chain.account(spelling);
        orchestrator
            .execute(params, &adapter, Some(&[recipient]))
            .await
            .unwrap();
    }

    let expected = chain.account(checksummed.clone());
    for (recipients, _) in network.sent() {
        assert_eq!(recipients, vec![expected.clone()]);
    }

    // Every spelling of the account finds all three transactions.
    for spelling in [checksummed.clone(), checksummed.to_lowercase()] {
        let result = orchestrator
            .query(&QueryFilter::new(QueryScope::Account(chain.account(spelling))))
            .await
            .unwrap();
        assert_eq!(result.transactions().count(), 3);
    }
}

#[universal_macros::test]
async fn signing_failures_are_not_submitted(mut rng: ChaCha8Rng) {
    let network = MockNetwork::new();
    let orchestrator = orchestrator(network.clone(), SchemaRegistry::new());
    let account = random_evm_account(&mut rng);
    let adapter = SignerAdapter::new(account.clone(), Arc::new(DecliningSigner));

    let params = ExecuteParams {
        target: random_hex_address(&mut rng),
        ..Default::default()
    };
    let err = orchestrator.execute(params, &adapter, None).await.unwrap_err();
    let Error::Signing(e) = &err else {
        panic!("expected a signing error, got {err}");
    };
    assert_eq!(e.account, account);
    assert!(!err.is_retry_safe());
    assert!(network.sent().is_empty());
}

#[universal_macros::test]
async fn submission_failures_report_retry_safety(mut rng: ChaCha8Rng) {
    let (_, adapter) = random_signer(&mut rng);
    let cases = [
        (NetworkError::Transport("connection refused".to_owned()), true),
        (
            NetworkError::Rejected {
                code: -32000,
                message: "insufficient funds".to_owned(),
            },
            false,
        ),
        (NetworkError::InvalidResponse("expected a hash".to_owned()), false),
    ];

    for (failure, retry_safe) in cases {
        let network = MockNetwork::new();
        network.fail_with(failure.clone());
        let orchestrator = orchestrator(network.clone(), SchemaRegistry::new());
        let params = ExecuteParams {
            target: random_hex_address(&mut rng),
            ..Default::default()
        };
        let err = orchestrator.execute(params, &adapter, None).await.unwrap_err();
        let Error::Submission(e) = &err else {
            panic!("expected a submission error, got {err}");
        };
        assert_eq!(e.source, failure);
        assert_eq!(e.retry_safe, retry_safe);
        assert_eq!(err.is_retry_safe(), retry_safe);
        // Exactly one attempt was made.
        assert_eq!(network.sent().len(), 1);
    }
}

#[universal_macros::test]
async fn application_messages(mut rng: ChaCha8Rng) {
    let network = MockNetwork::new();
    let orchestrator = orchestrator(network.clone(), chat_registry());
    let (_, adapter) = random_signer(&mut rng);
    let target = random_hex_address(&mut rng);

    let body = json!({ "text": "gm", "tip": "250000000000000000000000000000" });
    let params = ExecuteParams {
        target: target.clone(),
        message: Some(AppMessage {
            category: "CHAT:MESSAGE".to_owned(),
            body: body.clone(),
        }),
        ..Default::default()
    };
    orchestrator.execute(params, &adapter, None).await.unwrap();

    let result = orchestrator
        .query(&QueryFilter::new(QueryScope::Category("CHAT:MESSAGE".to_owned())))
        .await
        .unwrap();
    let tx = result.transactions().next().unwrap();
    assert_eq!(tx.category, "CHAT:MESSAGE");
    let decoded = orchestrator.decode_message(tx).unwrap();
    assert_eq!(
        decoded.message,
        Some(AppMessage {
            category: "CHAT:MESSAGE".to_owned(),
            body,
        })
    );

    // A transaction whose envelope category disagrees with its message is rejected.
    let mut relabelled = tx.clone();
    relabelled.category = "CHAT:OTHER".to_owned();
    assert!(matches!(
        orchestrator.decode_message(&relabelled),
        Err(Error::Schema(SchemaError::Decode(_)))
    ));

    let mut truncated = tx.clone();
    truncated.data = truncated.data.slice(..truncated.data.len() / 2).into();
    assert!(matches!(
        orchestrator.decode_message(&truncated),
        Err(Error::Schema(_))
    ));
}

#[universal_macros::test]
async fn invalid_messages_are_never_signed(mut rng: ChaCha8Rng) {
    let network = MockNetwork::new();
    let orchestrator = orchestrator(network.clone(), chat_registry());
    let adapter = SignerAdapter::new(random_evm_account(&mut rng), Arc::new(DecliningSigner));

    let cases = [
        ("CHAT:MESSAGE", json!({ "text": 5 })),
        ("CHAT:MESSAGE", json!({ "text": "gm", "tip": 1.5 })),
        ("CHAT:MESSAGE", json!({ "tip": "1" })),
        ("CHAT:MESSAGE", json!({ "text": "gm", "extra": true })),
        ("PAY:REQUEST", json!({ "text": "gm" })),
    ];
    for (category, body) in cases {
        let params = ExecuteParams {
            target: random_hex_address(&mut rng),
            message: Some(AppMessage {
                category: category.to_owned(),
                body: body.clone(),
            }),
            ..Default::default()
        };
        let err = orchestrator.execute(params, &adapter, None).await.unwrap_err();
        assert!(matches!(err, Error::Schema(_)), "{body}: {err}");
    }
    assert!(network.sent().is_empty());
}

#[universal_macros::test]
async fn query_validates_and_passes_through(mut rng: ChaCha8Rng) {
    let network = MockNetwork::new();
    let orchestrator = orchestrator(network.clone(), SchemaRegistry::new());

    let invalid = [
        QueryFilter {
            limit: 0,
            ..QueryFilter::new(QueryScope::All)
        },
        QueryFilter {
            limit: 101,
            ..QueryFilter::new(QueryScope::All)
        },
        QueryFilter {
            page: 0,
            ..QueryFilter::new(QueryScope::All)
        },
        QueryFilter::new(QueryScope::Category("nonsense".to_owned())),
        QueryFilter::new(QueryScope::Account(UniversalAccount::new(
            "eip155", "1", "0xABCDEF",
        ))),
    ];
    for filter in invalid {
        assert!(orchestrator.query(&filter).await.is_err(), "{filter:?}");
    }
    assert!(network.queries().is_empty());

    let filter = QueryFilter {
        start_time: Some(rng.gen_range(0..1_000)),
        page: 2,
        limit: 100,
        ..QueryFilter::new(QueryScope::Account(random_evm_account(&mut rng)))
    };
    // Reads are never cached.
    orchestrator.query(&filter).await.unwrap();
    orchestrator.query(&filter).await.unwrap();
    assert_eq!(network.queries(), vec![filter.clone(), filter.clone()]);

    network.fail_with(NetworkError::Transport("timed out".to_owned()));
    let err = orchestrator.query(&filter).await.unwrap_err();
    assert!(matches!(err, Error::Query(NetworkError::Transport(_))));
    assert!(err.is_retry_safe());
}

#[universal_macros::test]
async fn pages_of_history(mut rng: ChaCha8Rng) {
    let network = MockNetwork::new();
    let orchestrator = orchestrator(network.clone(), SchemaRegistry::new());
    let (_, adapter) = random_signer(&mut rng);

    let mut handles = Vec::new();
    for _ in 0..5 {
        let params = ExecuteParams {
            target: random_hex_address(&mut rng),
            value: Some(BigUint::from(rng.r#gen::<u64>())),
            ..Default::default()
        };
        handles.push(orchestrator.execute(params, &adapter, None).await.unwrap());
    }

    let filter = QueryFilter {
        limit: 2,
        ..QueryFilter::new(QueryScope::All)
    };
    let mut seen = Vec::new();
    for page in 1..=3 {
        let result = orchestrator
            .query(&QueryFilter { page, ..filter.clone() })
            .await
            .unwrap();
        seen.extend(result.transactions().map(|tx| tx.hash));
    }
    // Newest first.
    handles.reverse();
    assert_eq!(seen, handles);
}

fn as_transaction(envelope: &SignedEnvelope) -> Transaction {
    Transaction {
        hash: TxHandle(Default::default()),
        category: envelope.category.clone(),
        data: envelope.data.clone(),
        from: envelope.from.clone(),
        recipients: Vec::new(),
        timestamp: 0,
    }
}
