//! Tests for concurrent CHANGE requests converging through the dispatcher's
//! serialized rebase, and for disconnect cleanup.

use anyhow::Result;

mod common;
use common::{connect, start_server};

async fn login(client: &mut common::LineClient, user: &str) -> Result<()> {
    client.send(&format!("LOGIN&userName={user}&")).await?;
    client.recv().await?;
    client.recv().await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_inserts_at_same_position_converge_through_dispatcher() -> Result<()> {
    let addr = start_server().await?;
    let mut alice = connect(addr).await?;
    login(&mut alice, "alice").await?;
    alice.send("NEWDOC&userName=alice&docName=paper&").await?;
    alice.recv().await?; // created

    alice.send("OPENDOC&userName=alice&docName=paper&").await?;
    alice.recv().await?; // update
    alice.recv().await?; // opened

    let mut bob = connect(addr).await?;
    login(&mut bob, "bob").await?;
    bob.send("OPENDOC&userName=bob&docName=paper&").await?;
    // bob's OPENDOC broadcasts to both connections.
    alice.recv().await?; // update for bob's open
    alice.recv().await?; // opened for bob
    bob.recv().await?; // update for bob's open
    bob.recv().await?; // opened for bob

    // Seed "abc" via a real insertion against version 0, observed by both.
    alice
        .send("CHANGE&userName=alice&docName=paper&type=insertion&position=0&length=3&version=0&change=abc&")
        .await?;
    let seed_resp = alice.recv().await?;
    assert!(seed_resp.starts_with("changed&type=insertion&"));
    bob.recv().await?; // same broadcast

    // Both clients observed version 1. Alice inserts "X" at position 1
    // against v1; Bob inserts "Y" at position 1 against v1, racing.
    alice
        .send("CHANGE&userName=alice&docName=paper&type=insertion&position=1&length=1&version=1&change=X&")
        .await?;
    let alice_resp = alice.recv().await?;
    bob.recv().await?;
    assert!(alice_resp.contains("position=1&length=1&version=2&"));

    bob.send("CHANGE&userName=bob&docName=paper&type=insertion&position=1&length=1&version=1&change=Y&")
        .await?;
    let bob_resp = bob.recv().await?;
    alice.recv().await?;
    // Bob's insert, dequeued second, rebases past Alice's to position 2.
    assert!(bob_resp.contains("position=2&length=1&version=3&"), "{bob_resp}");

    alice.send("CORRECT_ERROR&userName=alice&docName=paper&").await?;
    let corrected = alice.recv().await?;
    assert!(corrected.contains("content=aXYbc&"), "{corrected}");

    Ok(())
}

#[tokio::test]
async fn insert_vs_delete_rebase_converges_through_dispatcher() -> Result<()> {
    let addr = start_server().await?;
    let mut alice = connect(addr).await?;
    login(&mut alice, "alice").await?;
    alice.send("NEWDOC&userName=alice&docName=paper&").await?;
    alice.recv().await?; // created
    alice.send("OPENDOC&userName=alice&docName=paper&").await?;
    alice.recv().await?; // update
    alice.recv().await?; // opened

    alice
        .send("CHANGE&userName=alice&docName=paper&type=insertion&position=0&length=5&version=0&change=hello&")
        .await?;
    alice.recv().await?;

    // A: append "!" against v1.
    alice
        .send("CHANGE&userName=alice&docName=paper&type=insertion&position=5&length=1&version=1&change=!&")
        .await?;
    let resp_a = alice.recv().await?;
    assert!(resp_a.contains("position=5&length=1&version=2&"));

    // B: delete(0, 2) also against v1, rebased past A's insert (no overlap).
    alice
        .send("CHANGE&userName=alice&docName=paper&type=deletion&position=0&length=2&version=1&")
        .await?;
    let resp_b = alice.recv().await?;
    assert!(resp_b.starts_with("changed&type=deletion&"));
    assert!(resp_b.contains("position=0&length=2&version=3&"), "{resp_b}");

    alice.send("CORRECT_ERROR&userName=alice&docName=paper&").await?;
    let corrected = alice.recv().await?;
    assert!(corrected.contains("content=llo!&"), "{corrected}");

    Ok(())
}

#[tokio::test]
async fn disconnecting_frees_the_user_name_for_relogin() -> Result<()> {
    let addr = start_server().await?;
    {
        let mut alice = connect(addr).await?;
        alice.send("LOGIN&userName=alice&").await?;
        alice.recv().await?;
        alice.recv().await?;
        // Dropping the client closes the socket without LOGOUT.
    }

    // Give the dispatcher/registry a moment to observe the EOF.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut alice2 = connect(addr).await?;
    alice2.send("LOGIN&userName=alice&").await?;
    let resp = alice2.recv().await?;
    assert!(resp.starts_with("loggedin&userName=alice&"), "{resp}");

    Ok(())
}
