use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use treestage::{merge, snapshot, split};
use treestage_testing::fixtures;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("treestage_{}_{}.snap", name, std::process::id()))
}

#[test]
fn snapshot_round_trip_restores_definition_and_payloads() -> anyhow::Result<()> {
    let state = fixtures::train_state(47)?;
    let (def, values) = split(&state)?;

    let path = temp_path("round_trip");
    snapshot::save(&path, &def, &values)?;
    let loaded = snapshot::load(&path)?;
    fs::remove_file(&path)?;

    assert_eq!(def, loaded.def);
    assert_eq!(def.fingerprint(), loaded.def.fingerprint());
    assert_eq!(values.len(), loaded.values.len());
    for (original, restored) in values.iter().zip(loaded.values.iter()) {
        assert_eq!(original.spec(), restored.spec());
        assert_eq!(original.data(), restored.data());
    }

    // A loaded snapshot merges into a working graph.
    let merged = merge(&loaded.def, &loaded.values)?;
    let (merged_def, _) = split(&merged)?;
    assert_eq!(def, merged_def);
    Ok(())
}

#[test]
fn snapshot_rejects_bad_magic() -> anyhow::Result<()> {
    let path = temp_path("bad_magic");
    fs::write(&path, b"NOTASNAPxxxxxxxxxxxxxxxx")?;
    let err = snapshot::load(&path).unwrap_err();
    fs::remove_file(&path)?;
    assert!(
        err.to_string().contains("magic"),
        "unexpected error: {err}"
    );
    Ok(())
}

#[test]
fn snapshot_rejects_truncation() -> anyhow::Result<()> {
    let state = fixtures::train_state(53)?;
    let (def, values) = split(&state)?;

    let path = temp_path("truncated");
    snapshot::save(&path, &def, &values)?;
    let full_len = fs::metadata(&path)?.len();
    let file = OpenOptions::new().write(true).open(&path)?;
    file.set_len(full_len - 16)?;
    drop(file);

    let err = snapshot::load(&path);
    fs::remove_file(&path)?;
    assert!(err.is_err(), "truncated snapshot should fail to load");
    Ok(())
}

#[test]
fn snapshot_refuses_misaligned_input() -> anyhow::Result<()> {
    let state = fixtures::train_state(59)?;
    let (def, values) = split(&state)?;
    let mut short = values.as_slice().to_vec();
    short.pop();

    let path = temp_path("misaligned");
    let err = snapshot::save(&path, &def, &short.into());
    assert!(err.is_err(), "misaligned snapshot input should be refused");
    assert!(!path.exists(), "no file should be created on refusal");
    Ok(())
}
