//! Firstboot package builder tests.

mod helpers;

use std::fs;
use std::path::Path;

use helpers::{FakeRunner, ACCOUNT_IMAGE_BYTES, PASSWORD_HASH_BYTES};
use replica::assets::Assets;
use replica::config::{AccountIdentity, PackageIdentity, PostinstallPolicy};
use replica::error::ReplicaError;
use replica::firstboot::{AccountDescriptor, FirstbootPackageBuilder, PackageLayout};
use replica::template::Templates;
use tempfile::TempDir;

fn descriptor(identity: AccountIdentity) -> AccountDescriptor {
    AccountDescriptor {
        identity,
        image_bytes: ACCOUNT_IMAGE_BYTES.to_vec(),
        password_hash: PASSWORD_HASH_BYTES.to_vec(),
    }
}

fn runner() -> FakeRunner {
    FakeRunner::new(Path::new("/nonexistent/rescue"))
}

#[test]
fn test_build_lays_out_payload_and_runs_tools() {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("pkginst");
    let templates = Templates::builtin();
    let package = PackageIdentity::default();
    let runner = runner();

    let product = FirstbootPackageBuilder::new(&runner, &templates, &package)
        .build(
            &descriptor(AccountIdentity::default()),
            &PostinstallPolicy::default(),
            &work,
        )
        .unwrap();

    assert_eq!(product, work.join("config.pkg"));
    assert!(product.is_file());

    let layout = PackageLayout::new(&work, &package);
    let account = AccountIdentity::default();
    assert!(layout
        .account_record(&account)
        .ends_with("private/var/db/dslocal/nodes/Default/users/vagrant.plist"));
    assert_eq!(
        fs::read(layout.pkg_root.join("private/var/db/shadow/hash/11112222-3333-4444-AAAA-BBBBCCCCDDDD")).unwrap(),
        PASSWORD_HASH_BYTES
    );

    let lines = runner.lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        runner.calls()[0].get_args(),
        &[
            "--quiet".to_string(),
            "--root".to_string(),
            layout.pkg_root.display().to_string(),
            "--scripts".to_string(),
            layout.scripts_dir.display().to_string(),
            "--identifier".to_string(),
            "com.vagrantup.config".to_string(),
            "--version".to_string(),
            "0.1".to_string(),
            layout.component_pkg.display().to_string(),
        ]
    );
    assert!(lines[1].starts_with("productbuild --package"));
}

#[test]
fn test_account_record_is_a_valid_plist() {
    let tmp = TempDir::new().unwrap();
    let templates = Templates::builtin();
    let package = PackageIdentity::default();
    let runner = runner();

    FirstbootPackageBuilder::new(&runner, &templates, &package)
        .build(
            &descriptor(AccountIdentity::default()),
            &PostinstallPolicy::default(),
            tmp.path(),
        )
        .unwrap();

    let layout = PackageLayout::new(tmp.path(), &package);
    let record = plist::Value::from_file(layout.account_record(&AccountIdentity::default())).unwrap();
    let dict = record.as_dictionary().unwrap();

    let first = |key: &str| dict.get(key).and_then(|v| v.as_array()).and_then(|a| a.first()).cloned();
    assert_eq!(first("name").unwrap().as_string(), Some("vagrant"));
    assert_eq!(first("uid").unwrap().as_string(), Some("501"));
    assert_eq!(first("gid").unwrap().as_string(), Some("20"));
    assert_eq!(first("home").unwrap().as_string(), Some("/Users/vagrant"));
    assert_eq!(first("jpegphoto").unwrap().as_data(), Some(ACCOUNT_IMAGE_BYTES));
}

#[test]
fn test_postinstall_script_carries_policy() {
    let tmp = TempDir::new().unwrap();
    let templates = Templates::builtin();
    let package = PackageIdentity::default();
    let runner = runner();
    let policy = PostinstallPolicy {
        disable_remote_management: false,
        disable_screen_sharing: true,
        disable_sip: true,
    };

    FirstbootPackageBuilder::new(&runner, &templates, &package)
        .build(&descriptor(AccountIdentity::default()), &policy, tmp.path())
        .unwrap();

    let script_path = PackageLayout::new(tmp.path(), &package).postinstall_script();
    let script = fs::read_to_string(&script_path).unwrap();
    assert!(script.starts_with("#!/bin/sh\nUSER=\"vagrant\"\n"));
    assert!(script.contains("if [ 1 = 0 ]; then\n        $PlistBuddy -c 'Delete :com.apple.screensharing'"));
    assert!(script.contains("if [ 0 = 0 ]; then\n    echo \"enabled\" > \"$3/private/etc/RemoteManagement.launchd\""));
    assert!(script.contains("if [ 1 = 1 ]; then\n    csrutil disable"));
    assert!(script.contains("chown -R \"$USER_UID\":20 \"$3/Users/$USER\""));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        assert_eq!(fs::metadata(&script_path).unwrap().permissions().mode() & 0o777, 0o755);
    }
}

#[test]
fn test_custom_account_identity() {
    let tmp = TempDir::new().unwrap();
    let templates = Templates::builtin();
    let package = PackageIdentity::default();
    let runner = runner();
    let identity = AccountIdentity {
        username: "ci".to_string(),
        ..AccountIdentity::default()
    };

    FirstbootPackageBuilder::new(&runner, &templates, &package)
        .build(&descriptor(identity.clone()), &PostinstallPolicy::default(), tmp.path())
        .unwrap();

    let record = PackageLayout::new(tmp.path(), &package).account_record(&identity);
    assert!(record.ends_with("users/ci.plist"));
    assert!(fs::read_to_string(record).unwrap().contains("<string>/Users/ci</string>"));
}

#[test]
fn test_pkgbuild_failure_names_tool_and_status() {
    let tmp = TempDir::new().unwrap();
    let templates = Templates::builtin();
    let package = PackageIdentity::default();
    let runner = runner().failing_on("pkgbuild");

    let err = FirstbootPackageBuilder::new(&runner, &templates, &package)
        .build(
            &descriptor(AccountIdentity::default()),
            &PostinstallPolicy::default(),
            tmp.path(),
        )
        .unwrap_err();

    match &err {
        ReplicaError::PackageBuild { tool, status, detail } => {
            assert_eq!(tool, "pkgbuild");
            assert_eq!(*status, 1);
            assert_eq!(detail, "simulated failure");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("'pkgbuild' exited with status 1"));
    assert!(runner.lines_starting("productbuild").is_empty());
}

#[test]
fn test_payload_failure_names_step() {
    let tmp = TempDir::new().unwrap();
    let templates = Templates::builtin();
    let package = PackageIdentity::default();
    let runner = runner();
    // a plain file where the payload root should go
    fs::write(tmp.path().join("pkgroot"), b"").unwrap();

    let err = FirstbootPackageBuilder::new(&runner, &templates, &package)
        .build(
            &descriptor(AccountIdentity::default()),
            &PostinstallPolicy::default(),
            tmp.path(),
        )
        .unwrap_err();

    assert!(matches!(err, ReplicaError::PackagePayload { ref step, .. } if step == "payload layout"));
    assert!(err.to_string().contains("payload layout"));
    assert!(runner.calls().is_empty());
}

#[test]
fn test_password_hash_failure_names_step() {
    let tmp = TempDir::new().unwrap();
    let templates = Templates::builtin();
    let package = PackageIdentity::default();
    let account = AccountIdentity::default();
    let runner = runner();
    let hash_path = PackageLayout::new(tmp.path(), &package).password_hash(&account);
    fs::create_dir_all(&hash_path).unwrap();

    let err = FirstbootPackageBuilder::new(&runner, &templates, &package)
        .build(&descriptor(account), &PostinstallPolicy::default(), tmp.path())
        .unwrap_err();

    assert!(matches!(err, ReplicaError::PackagePayload { ref step, .. } if step == "password hash"));
    assert!(runner.calls().is_empty());
}

#[test]
fn test_productbuild_failure_names_tool() {
    let tmp = TempDir::new().unwrap();
    let templates = Templates::builtin();
    let package = PackageIdentity::default();
    let runner = runner().failing_on("productbuild");

    let err = FirstbootPackageBuilder::new(&runner, &templates, &package)
        .build(
            &descriptor(AccountIdentity::default()),
            &PostinstallPolicy::default(),
            tmp.path(),
        )
        .unwrap_err();

    assert!(matches!(err, ReplicaError::PackageBuild { ref tool, .. } if tool == "productbuild"));
}

#[test]
fn test_descriptor_from_assets() {
    let tmp = TempDir::new().unwrap();
    helpers::create_assets(tmp.path());

    let account = AccountDescriptor::from_assets(AccountIdentity::default(), &Assets::new(tmp.path())).unwrap();
    assert_eq!(account.image_bytes, ACCOUNT_IMAGE_BYTES);
    assert_eq!(account.password_hash, PASSWORD_HASH_BYTES);

    let empty = TempDir::new().unwrap();
    let err = AccountDescriptor::from_assets(AccountIdentity::default(), &Assets::new(empty.path())).unwrap_err();
    assert!(matches!(err, ReplicaError::NotFound { .. }));
}
