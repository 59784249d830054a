//! Crash recovery tests for `RedbStorage`.
//!
//! Records must survive database close/reopen cycles, simulating restarts.

use waxwing_core::{RedbStorage, Storage, StorageName, TYP_FRIENDSHIP, TYP_KEY};
use waxwing_crypto::{AesKey, EccKeyPair, KeyRecord, TypedKey};

#[test]
fn records_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.redb");

    let key_name = StorageName::keyring("mail", "work", TYP_KEY, "c1").to_string();
    let mut key = AesKey::from_bytes([3; 32]);
    key.add_principal("alice");
    key.invalidate("bob");

    {
        let storage = RedbStorage::open(&path).unwrap();
        storage.set(&key_name, &key.clone().into_record().encode().unwrap()).unwrap();
        let identity = EccKeyPair::from_secrets([1; 32], [2; 32]).into_record();
        storage.set("$global-id.YWxpY2U", &identity.encode().unwrap()).unwrap();
    }

    {
        let storage = RedbStorage::open(&path).unwrap();
        let restored = KeyRecord::decode(&storage.get(&key_name).unwrap()).unwrap();
        let restored: AesKey = restored.into_typed().unwrap();
        assert_eq!(restored, key);
        assert!(restored.invalid().contains("bob"));
        assert_eq!(storage.list_all().unwrap().len(), 2);
    }
}

#[test]
fn deletes_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.redb");
    let name = StorageName::principal("alice", TYP_FRIENDSHIP, "f1").to_string();

    {
        let storage = RedbStorage::open(&path).unwrap();
        storage.set(&name, b"record").unwrap();
        storage.delete(&name).unwrap();
    }

    let storage = RedbStorage::open(&path).unwrap();
    assert!(storage.get(&name).is_err());
    assert!(storage.list_names("user.").unwrap().is_empty());
}
