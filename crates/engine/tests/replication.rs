//! End-to-end replication between two database instances: the permanent
//! lane streamed into a replica's portion receiver, and the volatile lane
//! including erase propagation.

use std::sync::Arc;

use shotdb_engine::{
    DbConfig, DbInstance, Lane, NewShotParams, NoopObserver, PortionOutcome, ReadTarget,
    ShotName, SignalHeader, SignalId, Tier,
};
use tempfile::TempDir;

fn instance(dir: &TempDir, name: &str, read_only: bool) -> Arc<DbInstance> {
    let config = DbConfig {
        root: dir.path().join(name).join("data"),
        volatile_root: dir.path().join(name).join("vol"),
        sync_root: dir.path().join(name).join("sync"),
        read_only,
        ..DbConfig::default()
    };
    DbInstance::new(name, config).unwrap()
}

fn sid(n: u16) -> SignalId {
    SignalId::new(n).unwrap()
}

/// Pump every outbound item of a lane into the replica, in small portions,
/// confirming each delivery. Returns the number of items transferred.
fn pump(primary: &DbInstance, replica: &DbInstance, lane: Lane, tier: Tier) -> usize {
    let mut transferred = 0;
    while let Some(mut item) = primary.bup_next_to_send(lane).unwrap() {
        let (shot, file, op, total) = (item.shot.clone(), item.file.clone(), item.op, item.total);
        if item.is_erase() {
            let outcome = replica
                .accept_bup_portion(&shot, &file, tier, 0, 0, b"")
                .unwrap();
            assert_eq!(outcome, PortionOutcome::Erased);
        } else {
            let mut offset = 0u64;
            let mut buf = [0u8; 7];
            loop {
                let n = item.read_chunk(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                let outcome = replica
                    .accept_bup_portion(&shot, &file, tier, offset, total, &buf[..n])
                    .unwrap();
                offset += n as u64;
                if offset < total {
                    assert_eq!(outcome, PortionOutcome::InProgress);
                } else {
                    assert_eq!(outcome, PortionOutcome::Committed);
                }
            }
            assert_eq!(offset, total, "continuation produced the declared size");
        }
        primary.bup_confirm_delivery(lane, &shot, &file, op);
        transferred += 1;
    }
    transferred
}

#[test]
fn test_permanent_lane_replicates_byte_identical() {
    let dir = TempDir::new().unwrap();
    let primary = instance(&dir, "primary", false);
    let replica = instance(&dir, "replica", true);

    let name = ShotName::parse("2401151").unwrap();
    let shot = primary
        .open_shot(&name, true, NewShotParams::default(), false)
        .unwrap();
    let payload_a: Vec<u8> = (0..=255u8).cycle().take(500).collect();
    let payload_b = vec![0x5Au8; 33];
    for (id, payload) in [(sid(12), &payload_a), (sid(13), &payload_b)] {
        let header = SignalHeader::new(&name, id, payload.len() as u64, 1_705_276_800);
        primary
            .put_trace(&shot, Tier::Main, &header, payload, &NoopObserver)
            .unwrap();
    }

    primary.bup_reset_from("|0|").unwrap();
    let sent = pump(&primary, &replica, Lane::Permanent, Tier::Main);
    assert_eq!(sent, 3, "shot header plus two signals");

    // The replica serves exactly the bytes the primary stored.
    let replica_shot = replica
        .open_shot(&name, false, NewShotParams::default(), false)
        .unwrap();
    for (id, payload) in [(sid(12), &payload_a), (sid(13), &payload_b)] {
        let mut ours = shot.get_trace_reader(ReadTarget::Trace(id)).unwrap();
        let mut theirs = replica_shot.get_trace_reader(ReadTarget::Trace(id)).unwrap();
        let expected = ours.read_to_end().unwrap();
        let got = theirs.read_to_end().unwrap();
        assert_eq!(got, expected);
        assert_eq!(&got[got.len() - payload.len()..], &payload[..]);
    }
}

#[test]
fn test_captured_marker_prevents_resend() {
    let dir = TempDir::new().unwrap();
    let primary = instance(&dir, "primary", false);
    let replica = instance(&dir, "replica", true);

    let name = ShotName::parse("2401151").unwrap();
    let shot = primary
        .open_shot(&name, true, NewShotParams::default(), false)
        .unwrap();
    let header = SignalHeader::new(&name, sid(1), 8, 0);
    primary
        .put_trace(&shot, Tier::Main, &header, b"ABCDEFGH", &NoopObserver)
        .unwrap();

    primary.bup_reset_from("|0|").unwrap();
    assert!(pump(&primary, &replica, Lane::Permanent, Tier::Main) > 0);
    let marker = primary.bup_capture_marker();

    // Applying the captured marker finds nothing left to send.
    primary.bup_reset_from(&marker).unwrap();
    assert_eq!(pump(&primary, &replica, Lane::Permanent, Tier::Main), 0);

    // A signal written afterwards is picked up by the same marker.
    let header = SignalHeader::new(&name, sid(2), 3, 0);
    primary
        .put_trace(&shot, Tier::Main, &header, b"new", &NoopObserver)
        .unwrap();
    primary.bup_reset_from(&marker).unwrap();
    assert_eq!(pump(&primary, &replica, Lane::Permanent, Tier::Main), 1);
}

#[test]
fn test_volatile_lane_add_and_erase_propagate() {
    let dir = TempDir::new().unwrap();
    let primary = instance(&dir, "primary", false);
    let replica = instance(&dir, "replica", true);

    let name = ShotName::parse("2401151").unwrap();
    let shot = primary
        .open_shot(&name, true, NewShotParams::default(), false)
        .unwrap();
    let header = SignalHeader::new(&name, sid(12), 9, 0);
    primary
        .put_trace(&shot, Tier::Volatile, &header, b"transient", &NoopObserver)
        .unwrap();

    primary.bup_continue_from_volatile().unwrap();
    assert_eq!(pump(&primary, &replica, Lane::Volatile, Tier::Volatile), 1);
    let replica_file = dir
        .path()
        .join("replica/vol/2401/2401151/0012.000");
    assert!(replica_file.exists());

    // Erase on the primary reaches the replica as a zero-length portion.
    primary.delete_trace(&shot, sid(12), &NoopObserver).unwrap();
    primary.bup_continue_from_volatile().unwrap();
    assert_eq!(pump(&primary, &replica, Lane::Volatile, Tier::Volatile), 1);
    assert!(!replica_file.exists());
    assert!(replica_file.with_extension("003").exists());

    // Everything confirmed; a rescan finds no work.
    primary.bup_continue_from_volatile().unwrap();
    assert_eq!(pump(&primary, &replica, Lane::Volatile, Tier::Volatile), 0);
}

#[test]
fn test_malformed_marker_rejected() {
    let dir = TempDir::new().unwrap();
    let primary = instance(&dir, "primary", false);
    assert!(primary.bup_reset_from("garbage").is_err());
    // The lane is still usable afterwards.
    primary.bup_reset_from("|0|").unwrap();
}

#[test]
fn test_sticky_error_halts_lane_until_reset() {
    let dir = TempDir::new().unwrap();
    let primary = instance(&dir, "primary", false);
    primary.set_bup_visible_error(Lane::Permanent, "replica handshake failed");

    assert!(primary.bup_next_to_send(Lane::Permanent).is_err());
    assert!(primary.bup_reset_from("|0|").is_err());
    assert_eq!(
        primary.bup_visible_error(Lane::Permanent).as_deref(),
        Some("replica handshake failed")
    );

    primary.reset_bup_error(Lane::Permanent);
    primary.bup_reset_from("|0|").unwrap();
    assert!(primary.bup_next_to_send(Lane::Permanent).unwrap().is_none());
}
