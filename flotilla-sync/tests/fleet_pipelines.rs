//! End-to-end pipeline runs against the in-memory remote.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use flotilla_core::{FileSet, InstanceRef, InstanceSpec, SearchCriteria, SubscriptionId};
use flotilla_remote::{Credentials, InMemoryRemote, ProfileDescriptor, ProfileName, Session};
use flotilla_sync::{
    run_diff, run_migrate, run_update, BuildPolicy, DiffRequest, FleetRun, JobState,
    MigrateRequest, PlanOptions, TemplateSource, TransformHooks, UpdateOutcome, UpdateRequest,
};

const SUB: &str = "sub-0000000000000000";
const DEST: &str = "sub-1111111111111111";

fn sub(id: &str) -> SubscriptionId {
    id.parse().expect("subscription")
}

fn session(account: &str) -> Arc<Session> {
    Arc::new(Session::new(
        ProfileName::Named(account.to_string()),
        Credentials {
            token: "token".to_string(),
            profile: ProfileDescriptor {
                base_url: "mem://".to_string(),
                account: account.to_string(),
                subscription: None,
            },
        },
    ))
}

fn tagged(files: &[(&str, &str)], template_id: &str) -> InstanceSpec {
    let files: FileSet = files
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let mut spec = InstanceSpec::with_files(files);
    spec.metadata
        .insert("tags".to_string(), json!({ "template.id": template_id }));
    spec
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, content).expect("write");
}

fn local_update(dir: &Path, delete: bool, dry_run: bool) -> UpdateRequest {
    UpdateRequest {
        subscription: sub(SUB),
        source: TemplateSource::Local {
            path: dir.to_path_buf(),
            include: None,
        },
        criteria: SearchCriteria::new(["template.id=addon"]).expect("criteria"),
        instance: None,
        options: PlanOptions {
            force: false,
            delete,
        },
        dry_run,
        hooks: TransformHooks::new(),
        workers: 3,
        policy: BuildPolicy::default(),
        default_include: "template/".to_string(),
    }
}

fn completed<O>(run: FleetRun<O>) -> flotilla_sync::ExecutionReport<O> {
    match run {
        FleetRun::Completed(report) => report,
        FleetRun::NoTargets => panic!("expected targets"),
    }
}

#[tokio::test]
async fn update_with_delete_converges_and_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    write(dir.path(), "index.js", "v2");

    let remote = Arc::new(InMemoryRemote::new());
    let target = InstanceRef::new("b", "f");
    remote.insert(
        &sub(SUB),
        target.clone(),
        tagged(&[("index.js", "v1"), ("extra.js", "x")], "addon"),
    );

    let first = completed(
        run_update(remote.clone(), session("acc"), local_update(dir.path(), true, false))
            .await
            .expect("first run"),
    );
    assert_eq!(
        first.outcomes,
        vec![(
            target.clone(),
            UpdateOutcome::Updated(vec!["extra.js".to_string(), "index.js".to_string()])
        )]
    );
    let stored = remote.function(&sub(SUB), &target).expect("stored");
    assert_eq!(stored.files().len(), 1);
    assert_eq!(stored.files()["index.js"], "v2");
    assert_eq!(stored.metadata["tags"], json!({ "template.id": "addon" }));

    let second = completed(
        run_update(remote.clone(), session("acc"), local_update(dir.path(), true, false))
            .await
            .expect("second run"),
    );
    assert_eq!(second.outcomes, vec![(target, UpdateOutcome::UpToDate)]);
    assert_eq!(remote.puts().len(), 1);
}

#[tokio::test]
async fn dry_run_reports_changes_without_writing() {
    let dir = TempDir::new().expect("tempdir");
    write(dir.path(), "index.js", "v2");

    let remote = Arc::new(InMemoryRemote::new());
    for i in 0..4 {
        remote.insert(
            &sub(SUB),
            InstanceRef::new("b", format!("f{i}")),
            tagged(&[("index.js", "v1")], "addon"),
        );
    }

    let report = completed(
        run_update(remote.clone(), session("acc"), local_update(dir.path(), false, true))
            .await
            .expect("dry run"),
    );
    assert_eq!(report.applied(), 4);
    assert!(report
        .outcomes
        .iter()
        .all(|(_, o)| *o == UpdateOutcome::WouldUpdate(vec!["index.js".to_string()])));
    assert!(remote.puts().is_empty());
}

#[tokio::test]
async fn rejected_instance_is_reported_and_others_still_update() {
    let dir = TempDir::new().expect("tempdir");
    write(dir.path(), "index.js", "v2");

    let remote = Arc::new(InMemoryRemote::new());
    for i in 0..10 {
        remote.insert(
            &sub(SUB),
            InstanceRef::new("b", format!("f{i}")),
            tagged(&[("index.js", "v1")], "addon"),
        );
    }
    remote.fail_put(InstanceRef::new("b", "f3"), 400, "invalid configuration");

    let report = completed(
        run_update(remote.clone(), session("acc"), local_update(dir.path(), false, false))
            .await
            .expect("run"),
    );
    assert_eq!(report.total, 10);
    assert_eq!(report.applied(), 9);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].instance, InstanceRef::new("b", "f3"));
    assert_eq!(report.failures[0].reason, "400 invalid configuration");
    assert_eq!(remote.puts().len(), 9);
}

#[tokio::test(start_paused = true)]
async fn stuck_build_times_out_for_that_instance_only() {
    let dir = TempDir::new().expect("tempdir");
    write(dir.path(), "index.js", "v2");

    let remote = Arc::new(InMemoryRemote::new());
    remote.insert(
        &sub(SUB),
        InstanceRef::new("b", "slow"),
        tagged(&[("index.js", "v1")], "addon"),
    );
    remote.set_build_pending_polls(Some(100));

    let mut req = local_update(dir.path(), false, false);
    req.policy = BuildPolicy {
        attempts: 3,
        delay: Duration::from_millis(200),
    };
    let report = completed(run_update(remote, session("acc"), req).await.expect("run"));
    assert_eq!(report.applied(), 0);
    assert_eq!(
        report.failures[0].reason,
        "build did not complete within 600 ms"
    );
}

#[tokio::test]
async fn remote_template_defaults_criteria_and_include() {
    let remote = Arc::new(InMemoryRemote::new());
    let template = InstanceRef::new("tm", "addon");
    remote.insert(
        &sub(SUB),
        template.clone(),
        tagged(&[("template/index.js", "v2"), ("index.js", "template code")], "none"),
    );
    remote.insert(
        &sub(SUB),
        InstanceRef::new("b", "child"),
        tagged(&[("index.js", "v1")], "addon"),
    );
    remote.insert(
        &sub(SUB),
        InstanceRef::new("b", "unrelated"),
        tagged(&[("index.js", "v1")], "other"),
    );

    let req = UpdateRequest {
        source: TemplateSource::Remote {
            instance: template,
            include: None,
        },
        criteria: SearchCriteria::default(),
        ..local_update(Path::new("."), false, false)
    };
    let report = completed(run_update(remote.clone(), session("acc"), req).await.expect("run"));
    assert_eq!(
        report.outcomes,
        vec![(
            InstanceRef::new("b", "child"),
            UpdateOutcome::Updated(vec!["index.js".to_string()])
        )]
    );
    let child = remote
        .function(&sub(SUB), &InstanceRef::new("b", "child"))
        .expect("child");
    assert_eq!(child.files()["index.js"], "v2");
}

#[tokio::test]
async fn no_matching_functions_is_not_an_error() {
    let dir = TempDir::new().expect("tempdir");
    write(dir.path(), "index.js", "v2");
    let remote = Arc::new(InMemoryRemote::new());
    let run = run_update(remote, session("acc"), local_update(dir.path(), false, false))
        .await
        .expect("run");
    assert!(matches!(run, FleetRun::NoTargets));
}

#[tokio::test]
async fn diff_renders_one_patch_per_differing_file() {
    let dir = TempDir::new().expect("tempdir");
    write(dir.path(), "index.js", "one\ntwo\n");
    write(dir.path(), "same.js", "same\n");

    let remote = Arc::new(InMemoryRemote::new());
    remote.insert(
        &sub(SUB),
        InstanceRef::new("b", "f"),
        tagged(&[("index.js", "one\nTWO\n"), ("same.js", "same\n")], "addon"),
    );

    let req = DiffRequest {
        subscription: sub(SUB),
        source: TemplateSource::Local {
            path: dir.path().to_path_buf(),
            include: None,
        },
        criteria: SearchCriteria::default(),
        instance: Some(InstanceRef::new("b", "f")),
        default_include: "template/".to_string(),
    };
    let report = completed(run_diff(remote.clone(), session("acc"), req).await.expect("diff"));
    let (_, patches) = &report.outcomes[0];
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].path, "index.js");
    let expected_header = format!(
        "--- {}/index.js\tTemplate\n+++ {SUB}/b/f/index.js\tInstance\n",
        dir.path().display()
    );
    assert!(patches[0].patch.starts_with(&expected_header));
    assert_eq!(remote.search_calls(), 0);
    assert!(remote.puts().is_empty());
}

#[tokio::test]
async fn migrate_strips_account_identity() {
    let remote = Arc::new(InMemoryRemote::new());
    let mut spec = tagged(&[("index.js", "code")], "addon");
    spec.metadata
        .insert("subscriptionId".to_string(), json!(SUB));
    spec.metadata.insert("accountId".to_string(), json!("acc-src"));
    remote.insert(&sub(SUB), InstanceRef::new("b", "f"), spec);

    let req = MigrateRequest {
        source_subscription: sub(SUB),
        dest_subscription: sub(DEST),
        criteria: SearchCriteria::new(["template.id=addon"]).expect("criteria"),
        workers: 2,
        dry_run: false,
        policy: BuildPolicy::default(),
    };
    let report = completed(
        run_migrate(remote.clone(), session("acc-src"), session("acc-dest"), req.clone())
            .await
            .expect("migrate"),
    );
    assert_eq!(report.outcomes[0].1.state, JobState::Applied);
    assert!(report.outcomes[0].1.snapshot.is_none());

    let copied = remote
        .function(&sub(DEST), &InstanceRef::new("b", "f"))
        .expect("copied");
    assert!(!copied.metadata.contains_key("subscriptionId"));
    assert!(!copied.metadata.contains_key("accountId"));
    assert_eq!(copied.files()["index.js"], "code");

    let dry = MigrateRequest {
        dry_run: true,
        ..req
    };
    let puts_before = remote.puts().len();
    let report = completed(
        run_migrate(remote.clone(), session("acc-src"), session("acc-dest"), dry)
            .await
            .expect("dry migrate"),
    );
    assert_eq!(report.outcomes[0].1.state, JobState::SkippedDryRun);
    let snapshot = report.outcomes[0].1.snapshot.as_ref().expect("snapshot");
    assert!(!snapshot.metadata.contains_key("accountId"));
    assert_eq!(remote.puts().len(), puts_before);
}

#[tokio::test]
async fn migrate_requires_criteria() {
    let remote = Arc::new(InMemoryRemote::new());
    let req = MigrateRequest {
        source_subscription: sub(SUB),
        dest_subscription: sub(DEST),
        criteria: SearchCriteria::default(),
        workers: 1,
        dry_run: false,
        policy: BuildPolicy::default(),
    };
    let err = run_migrate(remote.clone(), session("a"), session("b"), req)
        .await
        .expect_err("empty criteria");
    assert_eq!(err.to_string(), "search criteria must not be empty");
    assert_eq!(remote.search_calls(), 0);
}
