use super::*;
use crate::crd::canary::{CanaryService, CanarySpec, TargetRef};
use crate::server::create_metrics;
use async_trait::async_trait;
use kube::api::ObjectMeta;
use std::sync::Mutex;

/// Router double that records `sync` calls and fails on demand
#[derive(Default)]
struct MockRouter {
    synced: Mutex<Vec<String>>,
    fail: bool,
}

impl MockRouter {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn synced(&self) -> Vec<String> {
        self.synced.lock().unwrap().clone()
    }
}

#[async_trait]
impl MeshRouter for MockRouter {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn sync(&self, canary: &Canary) -> Result<(), RouterError> {
        self.synced.lock().unwrap().push(canary.name_any());
        if self.fail {
            return Err(RouterError::Conflict {
                key: format!("{}/{}", canary.namespace().unwrap_or_default(), canary.name_any()),
                attempts: 5,
            });
        }
        Ok(())
    }

    async fn set_routes(&self, _: &Canary, _: i32, _: i32) -> Result<(), RouterError> {
        Ok(())
    }

    async fn get_routes(&self, _: &Canary) -> Result<(i32, i32), RouterError> {
        Ok((100, 0))
    }
}

fn create_test_canary(name: &str) -> Arc<Canary> {
    Arc::new(Canary {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: CanarySpec {
            target_ref: TargetRef {
                name: name.to_string(),
                ..Default::default()
            },
            service: CanaryService {
                port: 9898,
                ..Default::default()
            },
        },
    })
}

#[tokio::test]
async fn test_reconcile_syncs_and_requeues() {
    let router = Arc::new(MockRouter::default());
    let ctx = Arc::new(Context::new(router.clone(), None));

    let action = reconcile(create_test_canary("podinfo"), ctx).await.unwrap();

    assert_eq!(action, Action::requeue(RESYNC_INTERVAL));
    assert_eq!(router.synced(), vec!["podinfo"]);
}

#[tokio::test]
async fn test_reconcile_surfaces_router_error() {
    let ctx = Arc::new(Context::new(Arc::new(MockRouter::failing()), None));

    let err = reconcile(create_test_canary("podinfo"), ctx)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Router(RouterError::Conflict { attempts: 5, .. })
    ));
    assert!(err.to_string().contains("default/podinfo"));
}

#[tokio::test]
async fn test_reconcile_records_metrics() {
    let metrics = create_metrics().unwrap();

    let ok_ctx = Arc::new(Context::new(
        Arc::new(MockRouter::default()),
        Some(metrics.clone()),
    ));
    reconcile(create_test_canary("a"), ok_ctx).await.unwrap();

    let failing_ctx = Arc::new(Context::new(
        Arc::new(MockRouter::failing()),
        Some(metrics.clone()),
    ));
    let _ = reconcile(create_test_canary("b"), failing_ctx).await;

    let text = metrics.encode().unwrap();
    assert!(text.contains(r#"meshsplit_reconciliations_total{result="success"} 1"#));
    assert!(text.contains(r#"meshsplit_reconciliations_total{result="error"} 1"#));
    assert!(text.contains(
        r#"meshsplit_router_operations_total{operation="sync",result="error"} 1"#
    ));
}

#[test]
fn test_error_policy_requeues_after_delay() {
    let ctx = Arc::new(Context::new(Arc::new(MockRouter::default()), None));
    let error = ReconcileError::Router(RouterError::MissingTargetRef("default/podinfo".into()));

    let action = error_policy(create_test_canary("podinfo"), &error, ctx);

    assert_eq!(action, Action::requeue(ERROR_REQUEUE));
}
