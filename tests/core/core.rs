use entities::core::codec::parse_file;
use entities::core::config::{EntitiesConfig, IdRange, LockConfig};
use entities::core::error::EntitiesError;
use entities::core::mutator::acquire_lock;
use entities::core::reconcile::{ApplyOutcome, Reconciler};
use entities::core::record::{Group, GroupId, Members, Record, Shadow, User};
use entities::core::specfile::read_specification;
use fs2::FileExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::{TempDir, tempdir};

fn fixture(rel: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(rel)
}

/// Config whose targets are copies of the system fixtures inside `tmp`.
fn sandbox(tmp: &TempDir) -> EntitiesConfig {
    let config = EntitiesConfig {
        users_file: tmp.path().join("passwd"),
        groups_file: tmp.path().join("group"),
        shadow_file: tmp.path().join("shadow"),
        gshadow_file: tmp.path().join("gshadow"),
        dynamic_range: IdRange {
            min: 1000,
            max: 60000,
        },
        lock: LockConfig {
            dir: tmp.path().join("lock"),
            timeout_ms: 300,
            poll_interval_ms: 10,
        },
    };
    for name in ["passwd", "group", "shadow", "gshadow"] {
        fs::copy(fixture(&format!("system/{}", name)), tmp.path().join(name)).unwrap();
    }
    config
}

fn spec(rel: &str) -> Record {
    read_specification(&fixture(&format!("specs/{}", rel))).unwrap()
}

#[test]
fn group_apply_appends_merges_and_delete_restores() {
    let tmp = tempdir().unwrap();
    let config = sandbox(&tmp);
    let reconciler = Reconciler::new(&config);
    let original = fs::read_to_string(&config.groups_file).unwrap();

    let outcome = reconciler
        .apply(&spec("group/group.yaml"), &config.groups_file, false)
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Created);
    assert_eq!(
        fs::read_to_string(&config.groups_file).unwrap(),
        format!("{}foo:xx:1:one,two,tree\n", original)
    );

    let outcome = reconciler
        .apply(&spec("group/group_add.yaml"), &config.groups_file, false)
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Updated);
    assert_eq!(
        fs::read_to_string(&config.groups_file).unwrap(),
        format!("{}foo:xx:1:one,two,tree,four\n", original)
    );

    reconciler
        .delete(&spec("group/group_add.yaml"), &config.groups_file)
        .unwrap();
    assert_eq!(fs::read_to_string(&config.groups_file).unwrap(), original);
}

#[test]
fn group_apply_replaces_line_in_place() {
    let tmp = tempdir().unwrap();
    let config = sandbox(&tmp);
    Reconciler::new(&config)
        .apply(&spec("group/update.yaml"), &config.groups_file, false)
        .unwrap();

    let content = fs::read_to_string(&config.groups_file).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "nm-openconnect:x:979:");
    assert_eq!(lines[1], "sddm:xx:1:one,two,tree");
    assert_eq!(lines.len(), 8);
}

#[test]
fn safe_group_apply_keeps_gid_and_password() {
    let tmp = tempdir().unwrap();
    let config = sandbox(&tmp);
    Reconciler::new(&config)
        .apply(&spec("group/update.yaml"), &config.groups_file, true)
        .unwrap();

    let groups = parse_file::<Group>(&config.groups_file).unwrap();
    let sddm = &groups["sddm"];
    assert_eq!(sddm.gid, Some(GroupId::Fixed(978)));
    assert_eq!(sddm.password, "x");
    assert_eq!(sddm.users.to_csv(), "one,two,tree");
}

#[test]
fn safe_group_apply_rejects_gid_of_another_group() {
    let tmp = tempdir().unwrap();
    let config = sandbox(&tmp);
    let before = fs::read_to_string(&config.groups_file).unwrap();
    let desired = Record::Group(Group {
        name: "newgroup".to_string(),
        password: "x".to_string(),
        gid: Some(GroupId::Fixed(123)),
        users: Members::default(),
    });

    let err = Reconciler::new(&config)
        .apply(&desired, &config.groups_file, true)
        .unwrap_err();
    assert!(matches!(err, EntitiesError::MergeConflict(_)), "{err}");
    assert_eq!(fs::read_to_string(&config.groups_file).unwrap(), before);
}

#[test]
fn safe_update_rejects_gid_taken_after_an_earlier_apply() {
    let tmp = tempdir().unwrap();
    let config = sandbox(&tmp);
    let reconciler = Reconciler::new(&config);
    reconciler
        .apply(&spec("group/group.yaml"), &config.groups_file, true)
        .unwrap();
    let before = fs::read_to_string(&config.groups_file).unwrap();

    let err = reconciler
        .apply(&spec("group/update.yaml"), &config.groups_file, true)
        .unwrap_err();
    assert!(matches!(err, EntitiesError::MergeConflict(_)), "{err}");
    assert!(err.to_string().contains("group foo"), "{err}");
    assert_eq!(fs::read_to_string(&config.groups_file).unwrap(), before);
}

#[test]
fn dynamic_group_gets_lowest_free_gid() {
    let tmp = tempdir().unwrap();
    let mut config = sandbox(&tmp);
    config.dynamic_range = IdRange { min: 975, max: 990 };
    let reconciler = Reconciler::new(&config);

    for name in ["dyn-a", "dyn-b"] {
        let record = Record::Group(Group {
            name: name.to_string(),
            password: "x".to_string(),
            gid: Some(GroupId::Dynamic),
            users: Members::default(),
        });
        reconciler.create(&record, &config.groups_file).unwrap();
    }

    let groups = parse_file::<Group>(&config.groups_file).unwrap();
    assert_eq!(groups["dyn-a"].fixed_gid(), Some(980));
    assert_eq!(groups["dyn-b"].fixed_gid(), Some(981));
}

#[test]
fn user_update_and_add_delete_round_trip() {
    let tmp = tempdir().unwrap();
    let config = sandbox(&tmp);
    let reconciler = Reconciler::new(&config);
    let original = fs::read_to_string(&config.users_file).unwrap();

    reconciler
        .apply(&spec("simple/update.yaml"), &config.users_file, false)
        .unwrap();
    let updated = fs::read_to_string(&config.users_file).unwrap();
    assert!(updated.starts_with("root:x:0:0:Foo!:/home/foo:/bin/bash\nbin:x:1:1:"));
    assert_eq!(updated.lines().count(), original.lines().count());

    let tmp = tempdir().unwrap();
    let config = sandbox(&tmp);
    let reconciler = Reconciler::new(&config);
    reconciler
        .create(&spec("simple/user.yaml"), &config.users_file)
        .unwrap();
    assert_eq!(
        fs::read_to_string(&config.users_file).unwrap(),
        format!("{}foo:pass:0:0:Foo!:/home/foo:/bin/bash\n", original)
    );
    reconciler
        .delete(&spec("simple/user.yaml"), &config.users_file)
        .unwrap();
    assert_eq!(fs::read_to_string(&config.users_file).unwrap(), original);
}

#[test]
fn create_existing_and_delete_missing_fail() {
    let tmp = tempdir().unwrap();
    let config = sandbox(&tmp);
    let reconciler = Reconciler::new(&config);
    let before = fs::read_to_string(&config.users_file).unwrap();

    let err = reconciler
        .create(&spec("simple/update.yaml"), &config.users_file)
        .unwrap_err();
    assert!(matches!(err, EntitiesError::AlreadyExists(_)));

    let err = reconciler
        .delete(&spec("simple/user.yaml"), &config.users_file)
        .unwrap_err();
    assert!(matches!(err, EntitiesError::NotFound(_)));
    assert_eq!(fs::read_to_string(&config.users_file).unwrap(), before);
}

#[test]
fn create_then_apply_is_idempotent() {
    let tmp = tempdir().unwrap();
    let config = sandbox(&tmp);
    let reconciler = Reconciler::new(&config);
    let record = spec("simple/user.yaml");

    reconciler.create(&record, &config.users_file).unwrap();
    let after_create = fs::read_to_string(&config.users_file).unwrap();
    reconciler.apply(&record, &config.users_file, false).unwrap();
    assert_eq!(fs::read_to_string(&config.users_file).unwrap(), after_create);
}

#[test]
fn shadow_plaintext_is_hashed_and_hashes_are_kept() {
    let tmp = tempdir().unwrap();
    let config = sandbox(&tmp);
    let reconciler = Reconciler::new(&config);
    let original = fs::read_to_string(&config.shadow_file).unwrap();

    reconciler
        .apply(&spec("shadow/update.yaml"), &config.shadow_file, false)
        .unwrap();
    let shadows = parse_file::<Shadow>(&config.shadow_file).unwrap();
    let halt = &shadows["halt"];
    assert!(halt.password.starts_with("$6$"));
    assert!(sha_crypt::sha512_check("pass", &halt.password).is_ok());
    assert_eq!(
        (
            halt.last_changed.as_str(),
            halt.min_age.as_str(),
            halt.expire.as_str()
        ),
        ("1", "2", "6")
    );

    let tmp = tempdir().unwrap();
    let config = sandbox(&tmp);
    let reconciler = Reconciler::new(&config);
    reconciler
        .apply(&spec("shadow/user.yaml"), &config.shadow_file, false)
        .unwrap();
    assert_eq!(
        fs::read_to_string(&config.shadow_file).unwrap(),
        format!("{}foo:$bar:1:2:3:4:5:6:\n", original)
    );
    reconciler
        .delete(&spec("shadow/user.yaml"), &config.shadow_file)
        .unwrap();
    assert_eq!(fs::read_to_string(&config.shadow_file).unwrap(), original);
}

#[test]
fn gshadow_update_and_add() {
    let tmp = tempdir().unwrap();
    let config = sandbox(&tmp);
    let reconciler = Reconciler::new(&config);
    let original = fs::read_to_string(&config.gshadow_file).unwrap();

    reconciler
        .apply(&spec("gshadow/update.yaml"), &config.gshadow_file, false)
        .unwrap();
    assert_eq!(
        fs::read_to_string(&config.gshadow_file).unwrap(),
        original.replace("postmaster:!::", "postmaster:foo:barred:baz")
    );

    reconciler
        .apply(&spec("gshadow/gshadow.yaml"), &config.gshadow_file, false)
        .unwrap();
    assert!(
        fs::read_to_string(&config.gshadow_file)
            .unwrap()
            .ends_with("ldap:!::\ntest:!:foo,bar:foo,baz\n")
    );
}

#[test]
fn empty_target_gets_trailing_newline() {
    let tmp = tempdir().unwrap();
    let config = sandbox(&tmp);
    let target = tmp.path().join("fresh-passwd");
    fs::write(&target, "").unwrap();
    let record = Record::User(User {
        username: "svc".to_string(),
        password: "x".to_string(),
        uid: 900,
        gid: 900,
        info: String::new(),
        homedir: "/var/empty".to_string(),
        shell: "/sbin/nologin".to_string(),
    });

    Reconciler::new(&config).create(&record, &target).unwrap();
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        "svc:x:900:900::/var/empty:/sbin/nologin\n"
    );
}

#[test]
fn externally_held_lock_fails_apply() {
    let tmp = tempdir().unwrap();
    let config = sandbox(&tmp);
    fs::create_dir_all(&config.lock.dir).unwrap();
    let lock_path = config.lock.lock_path(&config.groups_file);
    let holder = fs::File::create(&lock_path).unwrap();
    holder.try_lock_exclusive().unwrap();
    let before = fs::read_to_string(&config.groups_file).unwrap();

    let started = Instant::now();
    let err = Reconciler::new(&config)
        .apply(&spec("group/update.yaml"), &config.groups_file, false)
        .unwrap_err();
    assert!(matches!(err, EntitiesError::LockFailed(_)));
    assert!(err.to_string().contains("Failed locking file"));
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(fs::read_to_string(&config.groups_file).unwrap(), before);

    FileExt::unlock(&holder).unwrap();
}

#[test]
fn concurrent_appliers_serialize_on_the_lock() {
    let tmp = tempdir().unwrap();
    let mut config = sandbox(&tmp);
    config.lock.timeout_ms = 5_000;
    let config = Arc::new(config);
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let config = Arc::clone(&config);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let record = Record::Group(Group {
                    name: "shared".to_string(),
                    password: "x".to_string(),
                    gid: Some(GroupId::Fixed(4242)),
                    users: Members::from_csv(&format!("member{}", i)),
                });
                barrier.wait();
                Reconciler::new(&config)
                    .apply(&record, &config.groups_file, false)
                    .unwrap()
            })
        })
        .collect();
    let outcomes: Vec<ApplyOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == ApplyOutcome::Created)
            .count(),
        1
    );
    let groups = parse_file::<Group>(&config.groups_file).unwrap();
    assert_eq!(groups["shared"].users.len(), 4);
}

#[test]
fn lock_file_is_removed_after_release() {
    let tmp = tempdir().unwrap();
    let config = sandbox(&tmp);
    let guard = acquire_lock(&config.groups_file, &config.lock).unwrap();
    let path = guard.path().to_path_buf();
    assert!(path.exists());
    drop(guard);
    assert!(!path.exists());
}
