use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use waitlist_gate::store::{MemoryStore, StoreError, SubmissionStore};
use waitlist_gate::{
    Axis, EmailAddress, GateBuilder, GateError, InvalidKind, ManualClock, RateLimitPolicy,
    SubmissionGate, SubmissionRecord, SurveyResponses, WindowConfig, DAY_MS,
};

/// Memory store that counts every call reaching it.
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    calls: AtomicUsize,
}

impl CountingStore {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubmissionStore for CountingStore {
    async fn insert_email(&self, email: &EmailAddress) -> Result<SubmissionRecord, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_email(email).await
    }

    async fn complete_survey(
        &self,
        email: &EmailAddress,
        responses: &SurveyResponses,
    ) -> Result<Vec<SubmissionRecord>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.complete_survey(email, responses).await
    }

    async fn list_recent(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_recent().await
    }
}

fn gate(policy: RateLimitPolicy) -> (SubmissionGate, Arc<CountingStore>, Arc<ManualClock>) {
    let store = Arc::new(CountingStore::default());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let gate = GateBuilder::new()
        .policy(policy)
        .store(store.clone())
        .clock(clock.clone())
        .build()
        .unwrap();
    (gate, store, clock)
}

fn ip_only(max_attempts: u32) -> RateLimitPolicy {
    RateLimitPolicy::unlimited().with_ip(Some(WindowConfig::per_day(max_attempts)))
}

fn survey(frustration: &str) -> Value {
    json!({
        "age": "18-24",
        "findMethod": "Broker",
        "frustration": frustration,
        "payForSchedule": "Yes"
    })
}

#[tokio::test]
async fn test_fourth_attempt_from_same_ip_never_reaches_store() {
    let (gate, store, _clock) = gate(ip_only(3));

    for email in ["one@b.com", "two@b.com", "three@b.com"] {
        gate.submit_email(email, "1.1.1.1").await.unwrap();
    }
    assert_eq!(store.calls(), 3);

    let err = gate.submit_email("four@b.com", "1.1.1.1").await.unwrap_err();
    assert!(matches!(
        err,
        GateError::RateLimited {
            axis: Axis::Ip,
            ..
        }
    ));
    assert_eq!(store.calls(), 3);

    // Same verdict for an address that was already admitted
    let err = gate.submit_email("one@b.com", "1.1.1.1").await.unwrap_err();
    assert!(matches!(err, GateError::RateLimited { .. }));
    assert_eq!(store.calls(), 3);
}

#[tokio::test]
async fn test_boundary_is_the_attempt_after_the_limit() {
    for limit in [1, 2, 5, 10] {
        let (gate, _store, _clock) = gate(ip_only(limit));

        for n in 0..limit {
            let email = format!("user{n}@b.com");
            assert!(
                gate.submit_email(&email, "9.9.9.9").await.is_ok(),
                "attempt {} of {limit} should pass",
                n + 1
            );
        }
        assert!(gate.submit_email("extra@b.com", "9.9.9.9").await.is_err());
    }
}

#[tokio::test]
async fn test_malformed_email_is_invalid_even_when_rate_limited() {
    let (gate, store, _clock) = gate(ip_only(1));
    gate.submit_email("a@b.com", "2.2.2.2").await.unwrap();

    for bad in ["no-at-sign.com", "user@nodot", "", "   ", "a b@c.com"] {
        assert_eq!(
            gate.submit_email(bad, "2.2.2.2").await,
            Err(GateError::InvalidInput(InvalidKind::Email)),
            "{bad:?}"
        );
    }
    assert_eq!(store.calls(), 1);
}

#[tokio::test]
async fn test_malformed_emails_spend_ip_quota() {
    let (gate, store, _clock) = gate(ip_only(2));

    for bad in ["bad", "also bad"] {
        assert_eq!(
            gate.submit_email(bad, "2.3.4.5").await,
            Err(GateError::InvalidInput(InvalidKind::Email))
        );
    }

    let err = gate.submit_email("good@b.com", "2.3.4.5").await.unwrap_err();
    assert!(matches!(
        err,
        GateError::RateLimited {
            axis: Axis::Ip,
            ..
        }
    ));
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_invalid_surveys_spend_ip_quota() {
    let (gate, store, _clock) = gate(ip_only(2));
    let incomplete = json!({ "age": "18-24" });

    for _ in 0..2 {
        assert_eq!(
            gate.submit_survey("a@b.com", &incomplete, "3.4.5.6").await,
            Err(GateError::InvalidInput(InvalidKind::Survey))
        );
    }

    let err = gate
        .submit_survey("a@b.com", &survey("Slow replies"), "3.4.5.6")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GateError::RateLimited {
            axis: Axis::Ip,
            ..
        }
    ));
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let (gate, store, _clock) = gate(RateLimitPolicy::unlimited());

    let record = gate.submit_email("dup@b.com", "1.1.1.1").await.unwrap();
    assert!(!record.survey_completed);

    assert_eq!(
        gate.submit_email(" DUP@b.com", "2.2.2.2").await,
        Err(GateError::Conflict)
    );
    assert_eq!(store.calls(), 2);
    assert_eq!(store.inner.len(), 1);
}

#[tokio::test]
async fn test_window_expiry_resets_count() {
    let (gate, _store, clock) = gate(ip_only(1));
    gate.submit_email("a@b.com", "3.3.3.3").await.unwrap();

    // Still inside the window at exactly W
    clock.advance_ms(DAY_MS);
    assert!(gate.submit_email("b@b.com", "3.3.3.3").await.is_err());

    clock.advance_ms(1);
    gate.submit_email("b@b.com", "3.3.3.3").await.unwrap();

    let ip = gate.limiter().axis(Axis::Ip).unwrap();
    assert_eq!(ip.current_count("3.3.3.3"), Some(1));
}

#[tokio::test]
async fn test_survey_without_prior_email_succeeds_with_no_rows() {
    let (gate, store, _clock) = gate(RateLimitPolicy::default());

    let rows = gate
        .submit_survey("ghost@b.com", &survey("Too many brokers"), "4.4.4.4")
        .await
        .unwrap();
    assert!(rows.is_empty());
    assert_eq!(store.calls(), 1);
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn test_overlong_frustration_is_invalid() {
    let (gate, store, _clock) = gate(RateLimitPolicy::default());
    gate.submit_email("a@b.com", "5.5.5.5").await.unwrap();

    let err = gate
        .submit_survey("a@b.com", &survey(&"x".repeat(501)), "5.5.5.5")
        .await
        .unwrap_err();
    assert_eq!(err, GateError::InvalidInput(InvalidKind::Survey));
    assert_eq!(err.public_message(), "Invalid survey data");
    assert_eq!(store.calls(), 1);

    let rows = gate
        .submit_survey("a@b.com", &survey(&"x".repeat(500)), "5.5.5.5")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_email_axis_caps_one_address_across_sources() {
    let policy = RateLimitPolicy::unlimited().with_email(Some(WindowConfig::per_hour(2)));
    let (gate, _store, _clock) = gate(policy);

    gate.submit_email("target@b.com", "10.0.0.1").await.unwrap();
    assert_eq!(
        gate.submit_email("target@b.com", "10.0.0.2").await,
        Err(GateError::Conflict)
    );

    let err = gate
        .submit_survey("Target@B.com", &survey("x"), "10.0.0.3")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GateError::RateLimited {
            axis: Axis::Email,
            ..
        }
    ));

    // Another address is unaffected
    gate.submit_email("other@b.com", "10.0.0.3").await.unwrap();
}

#[tokio::test]
async fn test_denied_attempts_consume_nothing() {
    let policy = RateLimitPolicy::unlimited()
        .with_ip(Some(WindowConfig::per_day(3)))
        .with_email(Some(WindowConfig::per_hour(1)));
    let (gate, _store, _clock) = gate(policy);

    gate.submit_email("a@b.com", "6.6.6.6").await.unwrap();
    for _ in 0..5 {
        let err = gate.submit_email("a@b.com", "6.6.6.6").await.unwrap_err();
        assert!(matches!(err, GateError::RateLimited { axis: Axis::Email, .. }));
    }

    // Email-axis denials handed their ip slots back
    gate.submit_email("b@b.com", "6.6.6.6").await.unwrap();
    gate.submit_email("c@b.com", "6.6.6.6").await.unwrap();
    assert!(gate.submit_email("d@b.com", "6.6.6.6").await.is_err());

    let stats = gate.stats();
    assert_eq!(stats.email.unwrap().total_denied, 5);
    assert_eq!(stats.ip.unwrap().total_released, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_never_over_admit() {
    let (gate, store, _clock) = gate(ip_only(3));
    let mut handles = Vec::new();

    for n in 0..32 {
        let gate = gate.clone();
        handles.push(tokio::spawn(async move {
            gate.submit_email(&format!("burst{n}@b.com"), "7.7.7.7").await
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(GateError::RateLimited { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(admitted, 3);
    assert_eq!(store.calls(), 3);
}

#[tokio::test]
async fn test_listing_is_newest_first() {
    let (gate, _store, _clock) = gate(RateLimitPolicy::unlimited());
    for email in ["first@b.com", "second@b.com"] {
        gate.submit_email(email, "8.8.8.8").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let listed = gate.list_submissions().await.unwrap();
    assert_eq!(listed[0].email, "second@b.com");
    assert_eq!(listed[1].email, "first@b.com");
}
