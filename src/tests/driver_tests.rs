//! Step-log driver: idempotent reruns, failure recovery and confirmation

#[cfg(test)]
mod driver_tests {
    use ckb_types::H256;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::dna::derive_dna;
    use crate::errors::ForgeError;
    use crate::observability::RunContext;
    use crate::rpc::TxStatus;
    use crate::test_utils::testnet_address;
    use crate::tests::test_helpers::*;
    use crate::tx_builder::cluster::ClusterSpec;
    use crate::workflow::driver::{cluster_step_key, committed_step_key, mint_step_key};
    use crate::workflow::{
        BatchDriver, ClusterRecord, ConfirmationPoller, MemoryStepLog, MintItem, StepLog, StepOutcome,
        StepRecord, StepState,
    };

    fn spec() -> ClusterSpec {
        ClusterSpec {
            name: "Genesis".to_string(),
            description: json!("first drop"),
        }
    }

    fn items(n: u64) -> Vec<MintItem> {
        (1..=n)
            .map(|token_id| MintItem {
                address: testnet_address(10 + token_id as u8),
                token_id,
            })
            .collect()
    }

    fn driver(fx: &Fixture, step_log: Arc<MemoryStepLog>) -> BatchDriver {
        let poller = ConfirmationPoller::new(
            fx.chain.clone(),
            Duration::from_millis(1),
            Duration::from_secs(5),
        );
        BatchDriver::new(fx.service.clone(), step_log, Some(poller), RunContext::new("test"))
    }

    #[tokio::test]
    async fn test_cluster_step_runs_once() {
        let fx = fixture(&[5000]);
        let log = Arc::new(MemoryStepLog::new());
        let driver = driver(&fx, log.clone());

        let first = driver.ensure_cluster(1, &spec()).await.unwrap();
        let second = driver.ensure_cluster(1, &spec()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fx.chain.submission_count(), 1);
        assert_eq!(driver.step_state(&cluster_step_key(1)).unwrap(), StepState::Completed);
        assert_eq!(driver.cluster_record(1).unwrap(), Some(first));
        assert_eq!(driver.cluster_record(2).unwrap(), None);
    }

    #[tokio::test]
    async fn test_rerun_of_completed_batch_submits_nothing() {
        let fx = fixture(&[5000]);
        let log = Arc::new(MemoryStepLog::new());
        let driver = driver(&fx, log.clone());
        let cluster = driver.ensure_cluster(1, &spec()).await.unwrap();
        let batch = items(3);

        let report = driver.mint_batch(1, &batch, &cluster, 840_000).await.unwrap();
        assert_eq!(report.submitted(), 3);
        assert!(report.skipped.is_empty());
        let submissions = fx.chain.submission_count();

        // A fresh driver over the same log, as after a restart
        let rerun = self::driver(&fx, log.clone())
            .mint_batch(1, &batch, &cluster, 840_000)
            .await
            .unwrap();
        assert_eq!(rerun.submitted(), 0);
        assert_eq!(rerun.skipped, report.minted);
        assert_eq!(fx.chain.submission_count(), submissions);
    }

    #[tokio::test]
    async fn test_mint_records_carry_dna_and_spore_id() {
        let fx = fixture(&[5000]);
        let driver = driver(&fx, Arc::new(MemoryStepLog::new()));
        let cluster = driver.ensure_cluster(1, &spec()).await.unwrap();
        let batch = items(1);

        let report = driver.mint_batch(2, &batch, &cluster, 840_000).await.unwrap();
        let record = &report.minted[0];
        assert_eq!(record.dna, derive_dna(840_000, 1, &batch[0].address).to_string());
        assert_eq!(record.token_id, 1);

        let tx = fx.chain.submitted().last().unwrap().transaction.clone();
        assert_eq!(record.tx_hash, tx.tx_hash());
        assert_eq!(
            tx.outputs[0].type_.as_ref().unwrap().args,
            record.spore_id.0.to_vec()
        );
        assert!(tx.cell_deps.iter().any(|dep| dep.out_point == cluster.out_point));
        assert_eq!(
            driver.step_state(&mint_step_key(2, 1)).unwrap(),
            StepState::Completed
        );
    }

    #[tokio::test]
    async fn test_failed_step_is_not_recorded_and_rerun_resumes() {
        let fx = fixture(&[5000]);
        let log = Arc::new(MemoryStepLog::new());
        let driver = driver(&fx, log.clone());
        let cluster = driver.ensure_cluster(1, &spec()).await.unwrap();
        let batch = items(3);

        fx.chain.reject_next("TransactionFailedToResolve");
        let err = driver.mint_batch(1, &batch, &cluster, 840_000).await.unwrap_err();
        assert!(matches!(err, ForgeError::Submission(_)));
        assert!(!log.exists(&mint_step_key(1, 1)).unwrap());
        assert_eq!(driver.step_state(&mint_step_key(1, 1)).unwrap(), StepState::NotStarted);

        let report = driver.mint_batch(1, &batch, &cluster, 840_000).await.unwrap();
        assert_eq!(report.submitted(), 3);
        // cluster and three mints, each with its commit marker
        assert_eq!(log.len(), 8);
    }

    #[tokio::test]
    async fn test_existing_record_short_circuits_action() {
        let fx = fixture(&[5000]);
        let log = Arc::new(MemoryStepLog::new());
        let recorded = ClusterRecord {
            cluster_id: H256([1; 32]),
            out_point: crate::types::OutPoint::new(H256([2; 32]), 0),
            tx_hash: H256([2; 32]),
        };
        log.write(&cluster_step_key(4), &serde_json::to_value(&recorded).unwrap())
            .unwrap();
        let driver = driver(&fx, log);
        let calls = AtomicUsize::new(0);

        let outcome = driver
            .run_step(&cluster_step_key(4), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok((H256([3; 32]), recorded.clone()))
            })
            .await
            .unwrap();

        assert!(outcome.was_skipped());
        assert_eq!(outcome.into_inner(), recorded);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.chain.submission_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_step_is_recorded_before_timeout() {
        let fx = fixture(&[]);
        let log = Arc::new(MemoryStepLog::new());
        let poller = ConfirmationPoller::new(
            fx.chain.clone(),
            Duration::from_secs(5),
            Duration::from_secs(30),
        );
        let driver = BatchDriver::new(fx.service.clone(), log.clone(), Some(poller), RunContext::new("test"));

        let err = driver
            .run_step("mint-9-9", || async { Ok((H256([7; 32]), json!({"token_id": 9}))) })
            .await
            .unwrap_err();

        assert!(matches!(err, ForgeError::ConfirmationTimeout { .. }));
        let record = log.read("mint-9-9").unwrap().unwrap();
        assert_eq!(record.tx_hash, Some(H256([7; 32])));
        assert_eq!(record.payload["token_id"], 9);
        assert!(!driver.is_committed("mint-9-9").unwrap());
        assert_eq!(driver.step_state("mint-9-9").unwrap(), StepState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_mint_is_not_resubmitted_on_rerun() {
        let fx = fixture(&[5000]);
        let log = Arc::new(MemoryStepLog::new());
        let cluster = driver(&fx, log.clone()).ensure_cluster(1, &spec()).await.unwrap();
        let batch = items(1);
        let step_key = mint_step_key(1, 1);

        let slow = || {
            let poller = ConfirmationPoller::new(
                fx.chain.clone(),
                Duration::from_secs(5),
                Duration::from_secs(30),
            );
            BatchDriver::new(fx.service.clone(), log.clone(), Some(poller), RunContext::new("test"))
        };

        fx.chain.hold_commits();
        let err = slow().mint_batch(1, &batch, &cluster, 840_000).await.unwrap_err();
        assert!(matches!(err, ForgeError::ConfirmationTimeout { .. }));
        assert!(log.exists(&step_key).unwrap());
        let submissions = fx.chain.submission_count();

        // Still pending: the rerun polls the recorded hash and times out again
        let err = slow().mint_batch(1, &batch, &cluster, 840_000).await.unwrap_err();
        assert!(matches!(err, ForgeError::ConfirmationTimeout { .. }));
        assert_eq!(fx.chain.submission_count(), submissions);

        fx.chain.release_commits();
        let rerun = slow().mint_batch(1, &batch, &cluster, 840_000).await.unwrap();
        assert_eq!(rerun.submitted(), 0);
        assert_eq!(rerun.skipped.len(), 1);
        assert_eq!(fx.chain.submission_count(), submissions);
        assert!(log.exists(&committed_step_key(&step_key)).unwrap());

        // One cluster transaction, then exactly one mint
        let mints: Vec<H256> = fx.chain.submitted()[1..].iter().map(|tx| tx.hash()).collect();
        assert_eq!(mints, vec![rerun.skipped[0].tx_hash.clone()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recorded_step_rejected_on_resume_is_not_resubmitted() {
        let fx = fixture(&[]);
        let log = Arc::new(MemoryStepLog::new());
        let tx_hash = H256([8; 32]);
        log.write_record(&StepRecord::submitted("mint-3-1", tx_hash.clone(), json!({"token_id": 1})))
            .unwrap();
        fx.chain.set_status(&tx_hash, TxStatus::Rejected(Some("dead input".to_string())));
        let driver = driver(&fx, log.clone());
        let calls = AtomicUsize::new(0);

        let err = driver
            .run_step("mint-3-1", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok((H256([9; 32]), json!({"token_id": 1})))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ForgeError::Submission(ref msg) if msg.contains("dead input")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!driver.is_committed("mint-3-1").unwrap());
    }

    #[tokio::test]
    async fn test_without_poller_records_on_acceptance() {
        let fx = fixture(&[]);
        let log = Arc::new(MemoryStepLog::new());
        let driver = BatchDriver::new(fx.service.clone(), log.clone(), None, RunContext::new("test"));

        let outcome: StepOutcome<serde_json::Value> = driver
            .run_step("mint-9-9", || async { Ok((H256([7; 32]), json!({"token_id": 9}))) })
            .await
            .unwrap();

        assert!(!outcome.was_skipped());
        assert_eq!(log.read("mint-9-9").unwrap().unwrap().payload["token_id"], 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_reports_rejection() {
        let fx = fixture(&[]);
        let hash = H256([5; 32]);
        fx.chain.set_status(&hash, TxStatus::Rejected(Some("double spend".to_string())));
        let poller = ConfirmationPoller::new(fx.chain.clone(), Duration::from_secs(1), Duration::from_secs(10));

        let err = poller.wait_committed(&hash).await.unwrap_err();
        assert!(matches!(err, ForgeError::Submission(ref msg) if msg.contains("double spend")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_survives_read_errors() {
        let fx = fixture(&[]);
        let hash = H256([6; 32]);
        fx.chain.set_status(&hash, TxStatus::Committed);
        fx.chain.fail_status_reads(2);
        let poller = ConfirmationPoller::new(fx.chain.clone(), Duration::from_secs(1), Duration::from_secs(10));

        assert!(poller.wait_committed(&hash).await.is_ok());
    }
}
