//! # CRUD Persistence Cycles
//!
//! End-to-end insert/update/delete flows with full release + reopen cycles
//! between commits, so every assertion after a reopen is backed by the file
//! alone.

mod common;

use common::{Note, User};
use flatdb::{release_shared_cache, Context, StoreError, Tracked};
use tempfile::tempdir;

fn open_users(path: &std::path::Path) -> Context {
    Context::builder()
        .path(path)
        .table::<User>("Users")
        .open()
        .unwrap()
}

#[test]
fn insert_then_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crm.db");

    {
        let ctx = open_users(&path);
        let users = ctx.table::<User>("Users").unwrap();

        let alice = users.add(User::new("Alice", 30)).unwrap();
        let bob = users.add(User::new("Bob", 25)).unwrap();
        assert_eq!(alice.id(), 1);
        assert_eq!(bob.id(), 2);

        ctx.save_changes().unwrap();
        release_shared_cache(&path).unwrap();
    }

    let ctx = open_users(&path);
    let users = ctx.table::<User>("Users").unwrap();

    let loaded: Vec<Tracked<User>> = users.iter().unwrap().collect();
    assert_eq!(loaded.len(), 2);
    assert_eq!(users.count().unwrap(), 2);

    assert_eq!(loaded[0].read().name, "Alice");
    assert_eq!(loaded[0].id(), 1);
    assert_eq!(loaded[1].read().name, "Bob");
    assert_eq!(loaded[1].id(), 2);

    release_shared_cache(&path).unwrap();
}

#[test]
fn update_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crm.db");

    {
        let ctx = open_users(&path);
        let users = ctx.table::<User>("Users").unwrap();
        users.add(User::new("Alice", 30)).unwrap();
        users.add(User::new("Bob", 25)).unwrap();
        ctx.save_changes().unwrap();
        release_shared_cache(&path).unwrap();
    }

    {
        let ctx = open_users(&path);
        let users = ctx.table::<User>("Users").unwrap();

        let alice = users.find(1).unwrap().unwrap();
        alice.write().age = 31;
        users.update(&alice).unwrap();
        ctx.save_changes().unwrap();
        release_shared_cache(&path).unwrap();
    }

    let ctx = open_users(&path);
    let users = ctx.table::<User>("Users").unwrap();

    assert_eq!(users.count().unwrap(), 2);
    let alice = users.find(1).unwrap().unwrap();
    assert_eq!(alice.read().age, 31);

    release_shared_cache(&path).unwrap();
}

#[test]
fn delete_is_soft_and_file_length_is_stable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crm.db");

    {
        let ctx = open_users(&path);
        let users = ctx.table::<User>("Users").unwrap();
        users.add(User::new("Alice", 31)).unwrap();
        users.add(User::new("Bob", 25)).unwrap();
        ctx.save_changes().unwrap();
        release_shared_cache(&path).unwrap();
    }

    let len_before = std::fs::metadata(&path).unwrap().len();

    {
        let ctx = open_users(&path);
        let users = ctx.table::<User>("Users").unwrap();

        let bob = users.find(2).unwrap().unwrap();
        users.remove(&bob).unwrap();
        assert_eq!(users.count().unwrap(), 1);

        ctx.save_changes().unwrap();
        release_shared_cache(&path).unwrap();
    }

    // The tombstoned slot is retained, so the file does not shrink.
    assert_eq!(std::fs::metadata(&path).unwrap().len(), len_before);

    let ctx = open_users(&path);
    let users = ctx.table::<User>("Users").unwrap();

    let remaining: Vec<Tracked<User>> = users.iter().unwrap().collect();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].read().name, "Alice");

    release_shared_cache(&path).unwrap();
}

#[test]
fn over_long_text_truncates_at_a_character_boundary() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.db");

    {
        let ctx = Context::builder()
            .path(&path)
            .table::<Note>("Notes")
            .open()
            .unwrap();
        let notes = ctx.table::<Note>("Notes").unwrap();

        // "héllo" is six bytes; a blind five-byte prefix would split 'é'.
        notes
            .add(Note {
                id: 0,
                title: "héllo".to_string(),
            })
            .unwrap();
        ctx.save_changes().unwrap();
        release_shared_cache(&path).unwrap();
    }

    let ctx = Context::builder()
        .path(&path)
        .table::<Note>("Notes")
        .open()
        .unwrap();
    let notes = ctx.table::<Note>("Notes").unwrap();

    let note = notes.find(1).unwrap().unwrap();
    assert_eq!(note.read().title, "héll");

    release_shared_cache(&path).unwrap();
}

#[test]
fn empty_commit_succeeds() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crm.db");

    let ctx = open_users(&path);
    ctx.save_changes().unwrap();
    ctx.save_changes().unwrap();
    assert_eq!(ctx.table::<User>("Users").unwrap().count().unwrap(), 0);

    release_shared_cache(&path).unwrap();
}

#[test]
fn explicit_id_is_preserved_and_gaps_stay_dead() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crm.db");

    {
        let ctx = open_users(&path);
        let users = ctx.table::<User>("Users").unwrap();

        let mut eve = User::new("Eve", 41);
        eve.id = 5;
        users.add(eve).unwrap();

        // The next assigned id continues past the explicit one.
        let frank = users.add(User::new("Frank", 52)).unwrap();
        assert_eq!(frank.id(), 6);

        ctx.save_changes().unwrap();
        release_shared_cache(&path).unwrap();
    }

    let ctx = open_users(&path);
    let users = ctx.table::<User>("Users").unwrap();

    let ids: Vec<i32> = users.iter().unwrap().map(|u| u.id()).collect();
    assert_eq!(ids, vec![5, 6]);

    release_shared_cache(&path).unwrap();
}

#[test]
fn duplicate_explicit_id_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crm.db");

    let ctx = open_users(&path);
    let users = ctx.table::<User>("Users").unwrap();

    let alice = users.add(User::new("Alice", 30)).unwrap();
    let mut imposter = User::new("Mallory", 99);
    imposter.id = alice.id();

    let result = users.add(imposter);
    assert!(matches!(
        result,
        Err(StoreError::DuplicateKey { id: 1, .. })
    ));

    release_shared_cache(&path).unwrap();
}

#[test]
fn deleted_id_can_be_re_added_and_revives_its_slot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crm.db");

    {
        let ctx = open_users(&path);
        let users = ctx.table::<User>("Users").unwrap();
        users.add(User::new("Alice", 30)).unwrap();
        ctx.save_changes().unwrap();

        let alice = users.find(1).unwrap().unwrap();
        users.remove(&alice).unwrap();
        ctx.save_changes().unwrap();
        assert_eq!(users.count().unwrap(), 0);

        let mut replacement = User::new("Alicia", 33);
        replacement.id = 1;
        users.add(replacement).unwrap();
        ctx.save_changes().unwrap();
        release_shared_cache(&path).unwrap();
    }

    let ctx = open_users(&path);
    let users = ctx.table::<User>("Users").unwrap();
    let records: Vec<Tracked<User>> = users.iter().unwrap().collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id(), 1);
    assert_eq!(records[0].read().name, "Alicia");

    release_shared_cache(&path).unwrap();
}

#[test]
fn closed_context_rejects_every_operation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crm.db");

    let ctx = open_users(&path);
    let users = ctx.table::<User>("Users").unwrap();

    ctx.close();
    ctx.close(); // idempotent

    assert!(matches!(
        users.add(User::new("Alice", 30)),
        Err(StoreError::Disposed)
    ));
    assert!(matches!(users.count(), Err(StoreError::Disposed)));
    assert!(matches!(ctx.save_changes(), Err(StoreError::Disposed)));
    assert!(matches!(
        ctx.table::<User>("Users").err(),
        Some(StoreError::Disposed)
    ));

    release_shared_cache(&path).unwrap();
}

#[test]
fn missing_path_is_a_configuration_error() {
    let result = Context::builder().table::<User>("Users").open();
    assert!(matches!(result, Err(StoreError::Configuration(_))));
}

#[test]
fn duplicate_table_declaration_is_rejected() {
    let dir = tempdir().unwrap();
    let result = Context::builder()
        .path(dir.path().join("crm.db"))
        .table::<User>("Users")
        .table::<User>("Users")
        .open();
    assert!(matches!(result, Err(StoreError::Configuration(_))));
}
