// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Channel and Wire Format Integration Tests
//!
//! Channels carrying encoded messages and handles end to end, checked
//! through the raw handle table where a process would see them.

use alloc::vec;
use alloc::vec::Vec;
use std::sync::Barrier;
use std::thread;

use crate::fidl::header::{DynamicFlags, TransactionHeader, HEADER_SIZE};
use crate::fidl::message::{IncomingMessage, OutgoingMessage};
use crate::fidl::metadata::{WireFormatMetadata, WireFormatVersion, MAGIC_NUMBER_INITIAL};
use crate::object::channel::Channel;
use crate::object::event::Event;
use crate::object::handle::{Handle, HandleBased, ObjectType};
use crate::object::handle_table::HandleTable;
use crate::status::Status;

crate::fidl_struct! {
    /// Request carrying one event
    struct Notify {
        event: Handle,
    }
}

/// Request with ordinal 7 and an event, answered with two bytes
#[test]
fn test_request_with_event_and_reply() {
    let (a, b) = Channel::create().unwrap();
    let event = Event::create().unwrap();
    let event_koid = event.koid();

    let header = TransactionHeader::new(42, 7, DynamicFlags::empty(), WireFormatVersion::V2);
    let mut request = Notify {
        event: event.into_handle(),
    };
    OutgoingMessage::encode(header, &mut request)
        .unwrap()
        .write(&a)
        .unwrap();
    assert!(request.event.is_invalid());

    let ticket = b.begin_read().unwrap();
    assert_eq!(ticket.message_size, HEADER_SIZE + 8);
    assert_eq!(ticket.handle_count, 1);
    let packet = b.accept_read(ticket).unwrap();
    assert_eq!(packet.handles()[0].koid(), event_koid);

    let (decoded, _) = TransactionHeader::decode(packet.data()).unwrap();
    let metadata = decoded.metadata();
    assert!(metadata.is_valid());
    assert_eq!(metadata.wire_format_version(), WireFormatVersion::V2);
    assert_eq!(decoded.ordinal, 7);

    let mut incoming = IncomingMessage::from_packet(packet).unwrap();
    let received: Notify = incoming.decode_body().unwrap();
    assert_eq!(received.event.object_type(), ObjectType::Event);

    let reply = TransactionHeader::new(incoming.txid(), 7, DynamicFlags::empty(), incoming.wire_format());
    OutgoingMessage::from_raw(reply, &[0xAB, 0xCD], Vec::new())
        .write(&b)
        .unwrap();

    let answer = IncomingMessage::from_packet(a.read().unwrap()).unwrap();
    assert_eq!(answer.txid(), 42);
    assert_eq!(answer.body(), &[0xAB, 0xCD]);
}

/// Transferred handles leave the sender and arrive exactly once
#[test]
fn test_handles_move_exactly_once() {
    let sender = HandleTable::new();
    let receiver = HandleTable::new();
    let (a, b) = Channel::create().unwrap();
    let raw_a = sender.add(a.into_handle()).unwrap();
    let raw_b = receiver.add(b.into_handle()).unwrap();

    let mut raws = Vec::new();
    let mut koids = Vec::new();
    for _ in 0..3 {
        let event = Event::create().unwrap();
        koids.push(event.koid());
        raws.push(sender.add(event.into_handle()).unwrap());
    }

    sender.write_channel(raw_a, b"caps", &raws).unwrap();
    for raw in &raws {
        assert_eq!(sender.get_info(*raw), Err(Status::BadHandle));
    }
    assert_eq!(sender.count(), 1);

    let (data, received) = receiver.read_channel(raw_b).unwrap();
    assert_eq!(data, b"caps");
    let received_koids: Vec<_> = received
        .iter()
        .map(|raw| receiver.get_info(*raw).unwrap().koid)
        .collect();
    assert_eq!(received_koids, koids);
    assert_eq!(receiver.count(), 4);
}

/// Writing toward a closed peer fails at once and still consumes handles
#[test]
fn test_write_to_closed_peer() {
    let (a, b) = Channel::create().unwrap();
    drop(b);

    let event = Event::create().unwrap();
    let mut handle = event.into_handle();
    let moved = handle.take();
    assert_eq!(a.write(b"late", vec![moved]), Err(Status::PeerClosed));
    assert!(handle.is_invalid());
}

/// Two readers observing the same packet: one accept wins
#[test]
fn test_concurrent_begin_read_single_winner() {
    for _ in 0..64 {
        let (a, b) = Channel::create().unwrap();
        a.write(b"only", Vec::new()).unwrap();
        let barrier = Barrier::new(2);

        let results: Vec<_> = thread::scope(|scope| {
            let readers: Vec<_> = (0..2)
                .map(|_| {
                    scope.spawn(|| {
                        let ticket = b.begin_read().unwrap();
                        barrier.wait();
                        b.accept_read(ticket).map(|packet| packet.data().to_vec())
                    })
                })
                .collect();
            readers.into_iter().map(|reader| reader.join().unwrap()).collect()
        });

        let winners = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results.contains(&Err(Status::BadState)));
        assert!(results.contains(&Ok(b"only".to_vec())));
    }
}

/// Concurrent writers: packets arrive whole and each writer stays in order
#[test]
fn test_concurrent_writers_keep_per_writer_order() {
    const WRITERS: usize = 4;
    const PACKETS: u32 = 100;

    let (a, b) = Channel::create().unwrap();
    let received: Vec<(usize, u32, usize, usize)> = thread::scope(|scope| {
        for writer in 0..WRITERS {
            let a = &a;
            scope.spawn(move || {
                for seq in 0..PACKETS {
                    let mut data = vec![writer as u8];
                    data.extend_from_slice(&seq.to_le_bytes());
                    data.resize(5 + (seq as usize % 7) * 16, 0xEE);
                    let handles: Vec<Handle> = (0..seq % 3)
                        .map(|_| Event::create().unwrap().into_handle())
                        .collect();
                    a.write(&data, handles).unwrap();
                }
            });
        }

        let reader = scope.spawn(|| {
            let mut seen = Vec::new();
            while seen.len() < WRITERS * PACKETS as usize {
                match b.read() {
                    Ok(packet) => {
                        let data = packet.data();
                        let seq = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
                        seen.push((data[0] as usize, seq, data.len(), packet.handle_count()));
                    }
                    Err(Status::ShouldWait) => thread::yield_now(),
                    Err(status) => panic!("read failed: {}", status),
                }
            }
            seen
        });
        reader.join().unwrap()
    });

    assert_eq!(b.read().map(|_| ()), Err(Status::ShouldWait));
    let mut next = [0u32; WRITERS];
    for (writer, seq, len, handle_count) in received {
        assert_eq!(seq, next[writer]);
        next[writer] += 1;
        assert_eq!(len, 5 + (seq as usize % 7) * 16);
        assert_eq!(handle_count, (seq % 3) as usize);
    }
    assert_eq!(next, [PACKETS; WRITERS]);
}

/// Metadata survives both encodings and rejects foreign magic numbers
#[test]
fn test_metadata_round_trip_all_flags() {
    for version in [WireFormatVersion::V1, WireFormatVersion::V2] {
        for dynamic in [DynamicFlags::empty(), DynamicFlags::FLEXIBLE] {
            let header = TransactionHeader::new(9, 0x1234, dynamic, version);
            let metadata = WireFormatMetadata::from_header(&header);
            assert_eq!(WireFormatMetadata::from_bytes(metadata.to_bytes()), metadata);
            assert_eq!(WireFormatMetadata::from_opaque(metadata.to_opaque()), metadata);
            assert_eq!(metadata.wire_format_version(), version);
        }
    }

    for magic in 0..=u8::MAX {
        let mut bytes = WireFormatMetadata::new(WireFormatVersion::V2).to_bytes();
        bytes[1] = magic;
        let metadata = WireFormatMetadata::from_bytes(bytes);
        assert_eq!(metadata.is_valid(), magic == MAGIC_NUMBER_INITIAL);
    }
}
