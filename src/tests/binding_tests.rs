// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Binding Integration Tests
//!
//! Servers and clients bound to a [`Loop`], talking over real channels.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use std::sync::Mutex;
use std::thread;

use crate::binding::{
    bind_server, Client, ClientConfig, EventHandler, Ownership, Protocol, ServerBindingRef,
    Transaction, UnbindInfo, UnbindReason,
};
use crate::dispatch::{Loop, LoopConfig};
use crate::fidl::error::{Error, Result};
use crate::fidl::header::{DynamicFlags, TransactionHeader};
use crate::fidl::message::{IncomingMessage, OutgoingMessage};
use crate::fidl::metadata::WireFormatVersion;
use crate::object::channel::Channel;
use crate::status::Status;
use crate::txn::TxnState;

const ECHO: u64 = 1;
const DEFER: u64 = 2;
const ABANDON: u64 = 3;
const CLOSE: u64 = 4;
const EVENT: u64 = 50;

/// What a test server observed
#[derive(Default)]
struct Record {
    unbinds: Mutex<Vec<UnbindReason>>,
    returned: Mutex<Option<Channel>>,
    deferred: Mutex<Vec<Transaction>>,
    waits: Mutex<Vec<(usize, usize)>>,
}

struct TestServer {
    record: Arc<Record>,
    event_loop: Loop,
}

impl Protocol for TestServer {
    fn name(&self) -> &'static str {
        "test"
    }

    fn dispatch(&self, mut message: IncomingMessage, txn: Transaction) -> Result<()> {
        match message.ordinal() {
            ECHO => {
                let mut value: u32 = message.decode_body()?;
                txn.reply(&mut value)
            }
            DEFER => {
                let armed = || self.event_loop.pending_waits() + self.event_loop.ready_count();
                let before = armed();
                txn.enable_next_dispatch();
                let after = armed();
                self.record.waits.lock().unwrap().push((before, after));
                self.record.deferred.lock().unwrap().push(txn);
                Ok(())
            }
            ABANDON => {
                drop(txn);
                Ok(())
            }
            CLOSE => txn.close(Status::AccessDenied),
            ordinal => {
                self.on_unknown_method(ordinal, txn);
                Ok(())
            }
        }
    }

    fn on_unbind(&self, info: UnbindInfo) {
        self.record.unbinds.lock().unwrap().push(info.reason);
        *self.record.returned.lock().unwrap() = info.channel;
    }
}

struct Fixture {
    event_loop: Loop,
    record: Arc<Record>,
    binding: ServerBindingRef,
    client: Client,
}

fn fixture() -> Fixture {
    let event_loop = Loop::new(LoopConfig::named("binding-test"));
    let record = Arc::new(Record::default());
    let (client_end, server_end) = Channel::create().unwrap();
    let server = TestServer {
        record: record.clone(),
        event_loop: event_loop.clone(),
    };
    let binding = bind_server(event_loop.dispatcher(), server_end, Ownership::owned(server)).unwrap();
    let client = Client::bind(event_loop.dispatcher(), client_end, ClientConfig::default(), None).unwrap();
    Fixture {
        event_loop,
        record,
        binding,
        client,
    }
}

type Slot<T> = Arc<Mutex<Option<Result<T>>>>;

fn slot<T>() -> Slot<T> {
    Arc::new(Mutex::new(None))
}

fn call_u32(client: &Client, ordinal: u64, value: u32) -> Slot<u32> {
    let result = slot();
    let sink = result.clone();
    client
        .call(ordinal, &mut { value }, move |reply: Result<u32>| {
            *sink.lock().unwrap() = Some(reply);
        })
        .unwrap();
    result
}

fn taken<T>(slot: &Slot<T>) -> Option<Result<T>> {
    slot.lock().unwrap().take()
}

#[test]
fn test_echo_round_trip() {
    let fx = fixture();
    let result = call_u32(&fx.client, ECHO, 5);
    assert_eq!(fx.client.pending_count(), 1);

    fx.event_loop.run_until_idle().unwrap();
    assert_eq!(taken(&result), Some(Ok(5)));
    assert_eq!(fx.client.pending_count(), 0);
    assert!(fx.binding.is_bound());
    assert!(fx.client.is_bound());
}

#[test]
fn test_unknown_method_closes_with_not_supported() {
    let fx = fixture();
    let result = call_u32(&fx.client, 99, 0);
    fx.event_loop.run_until_idle().unwrap();

    assert_eq!(taken(&result), Some(Err(Error::NoConnection)));
    assert_eq!(fx.client.epitaph(), Some(Status::NotSupported));
    assert!(!fx.binding.is_bound());
    assert_eq!(
        *fx.record.unbinds.lock().unwrap(),
        vec![UnbindReason::ProtocolError(Error::UnknownOrdinal(99))]
    );
    assert_eq!(
        fx.client.call(ECHO, &mut 1u32, |_: Result<u32>| {}),
        Err(Error::ClientChannelClosed {
            status: Status::NotSupported
        })
    );
}

#[test]
fn test_decode_error_reported_before_abandon() {
    let fx = fixture();
    let result = slot();
    let sink = result.clone();
    fx.client
        .call_raw(ECHO, &[1, 2, 3], Vec::new(), Box::new(move |reply| {
            *sink.lock().unwrap() = Some(reply.map(|message| message.txid()));
        }))
        .unwrap();
    fx.event_loop.run_until_idle().unwrap();

    assert_eq!(taken(&result), Some(Err(Error::NoConnection)));
    assert_eq!(fx.client.epitaph(), Some(Status::InvalidArgs));
    let unbinds = fx.record.unbinds.lock().unwrap();
    assert_eq!(unbinds.len(), 1);
    assert!(matches!(unbinds[0], UnbindReason::ProtocolError(_)));
}

#[test]
fn test_abandoned_transaction_closes_with_internal() {
    let fx = fixture();
    let result = call_u32(&fx.client, ABANDON, 0);
    fx.event_loop.run_until_idle().unwrap();

    assert_eq!(taken(&result), Some(Err(Error::NoConnection)));
    assert_eq!(fx.client.epitaph(), Some(Status::Internal));
    assert_eq!(*fx.record.unbinds.lock().unwrap(), vec![UnbindReason::Abandoned]);
}

#[test]
fn test_close_sends_epitaph() {
    let fx = fixture();
    let result = call_u32(&fx.client, CLOSE, 0);
    fx.event_loop.run_until_idle().unwrap();

    assert_eq!(taken(&result), Some(Err(Error::NoConnection)));
    assert_eq!(fx.client.epitaph(), Some(Status::AccessDenied));
    assert_eq!(
        *fx.record.unbinds.lock().unwrap(),
        vec![UnbindReason::Close(Status::AccessDenied)]
    );
}

#[test]
fn test_enable_next_dispatch_rearms_inside_handler() {
    let fx = fixture();
    let first = call_u32(&fx.client, DEFER, 0);
    let second = call_u32(&fx.client, DEFER, 0);
    fx.event_loop.run_until_idle().unwrap();

    // The server re-armed its wait while still in the handler; the wait
    // is either registered or already queued.
    let waits = fx.record.waits.lock().unwrap().clone();
    assert_eq!(waits.len(), 2);
    for (before, after) in waits {
        assert_eq!(after, before + 1);
    }
    assert_eq!(fx.binding.in_flight(), 2);

    let deferred: Vec<_> = fx.record.deferred.lock().unwrap().drain(..).collect();
    for (value, txn) in deferred.into_iter().enumerate() {
        assert_eq!(txn.state(), TxnState::Pending);
        txn.reply(&mut (value as u32 + 10)).unwrap();
    }
    fx.event_loop.run_until_idle().unwrap();
    assert_eq!(taken(&first), Some(Ok(10)));
    assert_eq!(taken(&second), Some(Ok(11)));
    assert_eq!(fx.binding.in_flight(), 0);
}

#[test]
fn test_unbind_cancels_late_replies_and_returns_channel() {
    let fx = fixture();
    let _pending = call_u32(&fx.client, DEFER, 0);
    fx.event_loop.run_until_idle().unwrap();

    fx.binding.unbind();
    assert!(!fx.binding.is_bound());
    assert_eq!(*fx.record.unbinds.lock().unwrap(), vec![UnbindReason::Unbind]);
    assert!(fx.record.returned.lock().unwrap().is_some());

    let txn = fx.record.deferred.lock().unwrap().pop().unwrap();
    assert_eq!(txn.state(), TxnState::Unbound);
    assert_eq!(txn.reply(&mut 1u32), Err(Error::Transport(Status::Canceled)));

    // Unbinding again does nothing.
    fx.binding.unbind();
    assert_eq!(fx.record.unbinds.lock().unwrap().len(), 1);
}

#[test]
fn test_client_drop_unbinds_server_with_peer_closed() {
    let fx = fixture();
    drop(fx.client);
    fx.event_loop.run_until_idle().unwrap();
    assert_eq!(*fx.record.unbinds.lock().unwrap(), vec![UnbindReason::PeerClosed]);
    assert!(!fx.binding.is_bound());
}

#[test]
fn test_shutdown_unbinds_and_fails_pending() {
    let fx = fixture();
    let result = call_u32(&fx.client, ECHO, 1);
    fx.event_loop.shutdown();

    assert_eq!(taken(&result), Some(Err(Error::NoConnection)));
    assert!(!fx.client.is_bound());
    assert_eq!(
        *fx.record.unbinds.lock().unwrap(),
        vec![UnbindReason::DispatcherShutdown]
    );
}

#[test]
fn test_external_server_dropped() {
    let event_loop = Loop::new(LoopConfig::named("external"));
    let record = Arc::new(Record::default());
    let server = Arc::new(TestServer {
        record: record.clone(),
        event_loop: event_loop.clone(),
    });
    let (client_end, server_end) = Channel::create().unwrap();
    let binding = bind_server(event_loop.dispatcher(), server_end, Ownership::external(&server)).unwrap();
    let client = Client::bind(event_loop.dispatcher(), client_end, ClientConfig::default(), None).unwrap();

    let first = call_u32(&client, ECHO, 3);
    event_loop.run_until_idle().unwrap();
    assert_eq!(taken(&first), Some(Ok(3)));

    drop(server);
    let second = call_u32(&client, ECHO, 4);
    event_loop.run_until_idle().unwrap();
    assert!(!binding.is_bound());
    assert_eq!(taken(&second), Some(Err(Error::NoConnection)));
    assert!(record.unbinds.lock().unwrap().is_empty());
}

#[derive(Default)]
struct Events {
    ordinals: Mutex<Vec<u64>>,
    errors: Mutex<Vec<Error>>,
}

impl EventHandler for Events {
    fn on_event(&self, message: IncomingMessage) {
        self.ordinals.lock().unwrap().push(message.ordinal());
    }

    fn on_fidl_error(&self, error: Error) {
        self.errors.lock().unwrap().push(error);
    }
}

#[test]
fn test_events_and_peer_closed_error() {
    let event_loop = Loop::new(LoopConfig::named("events"));
    let record = Arc::new(Record::default());
    let (client_end, server_end) = Channel::create().unwrap();
    let server = TestServer {
        record: record.clone(),
        event_loop: event_loop.clone(),
    };
    let binding = bind_server(event_loop.dispatcher(), server_end, Ownership::owned(server)).unwrap();
    let events = Arc::new(Events::default());
    let handler: Arc<dyn EventHandler> = events.clone();
    let client = Client::bind(event_loop.dispatcher(), client_end, ClientConfig::default(), Some(handler)).unwrap();

    binding.send_event(EVENT, &mut 8u32).unwrap();
    binding.send_event(EVENT + 1, &mut 9u32).unwrap();
    event_loop.run_until_idle().unwrap();
    assert_eq!(*events.ordinals.lock().unwrap(), vec![EVENT, EVENT + 1]);

    binding.unbind();
    drop(record.returned.lock().unwrap().take());
    event_loop.run_until_idle().unwrap();
    assert!(!client.is_bound());
    assert_eq!(
        *events.errors.lock().unwrap(),
        vec![Error::ClientChannelClosed {
            status: Status::PeerClosed
        }]
    );
    assert_eq!(
        binding.send_event(EVENT, &mut 0u32),
        Err(Error::Transport(Status::Canceled))
    );
}

#[test]
fn test_client_tolerates_unknown_txid() {
    let event_loop = Loop::new(LoopConfig::default());
    let (client_end, server_end) = Channel::create().unwrap();
    let client = Client::bind(event_loop.dispatcher(), client_end, ClientConfig::default(), None).unwrap();

    let stray = TransactionHeader::new(777, ECHO, DynamicFlags::empty(), WireFormatVersion::V2);
    OutgoingMessage::encode(stray, &mut 0u32)
        .unwrap()
        .write(&server_end)
        .unwrap();
    event_loop.run_until_idle().unwrap();
    assert!(client.is_bound());

    // The connection still carries calls.
    let result = call_u32(&client, ECHO, 21);
    let mut request = IncomingMessage::from_packet(server_end.read().unwrap()).unwrap();
    let mut value: u32 = request.decode_body().unwrap();
    let reply = TransactionHeader::new(request.txid(), ECHO, DynamicFlags::empty(), request.wire_format());
    OutgoingMessage::encode(reply, &mut value)
        .unwrap()
        .write(&server_end)
        .unwrap();
    event_loop.run_until_idle().unwrap();
    assert_eq!(taken(&result), Some(Ok(21)));
}

#[test]
fn test_replace_channel_fails_each_pending_once() {
    let event_loop = Loop::new(LoopConfig::default());
    let (client_end, _old_server) = Channel::create().unwrap();
    let client = Arc::new(
        Client::bind(event_loop.dispatcher(), client_end, ClientConfig::default(), None).unwrap(),
    );

    let counts = Arc::new(Mutex::new(vec![0usize; 5]));
    let errors = Arc::new(Mutex::new(Vec::new()));
    for index in 0..5 {
        let counts = counts.clone();
        let errors = errors.clone();
        let reentrant = client.clone();
        client
            .call_raw(ECHO, &[0; 8], Vec::new(), Box::new(move |reply| {
                counts.lock().unwrap()[index] += 1;
                errors.lock().unwrap().push(reply.map(|_| ()));
                if index == 2 {
                    reentrant
                        .call_raw(ECHO, &[0; 8], Vec::new(), Box::new(|_| {}))
                        .unwrap();
                }
            }))
            .unwrap();
    }
    assert_eq!(client.pending_count(), 5);

    let (fresh, new_server) = Channel::create().unwrap();
    assert!(client.replace_channel(fresh).unwrap().is_some());

    assert_eq!(*counts.lock().unwrap(), vec![1, 1, 1, 1, 1]);
    assert!(errors.lock().unwrap().iter().all(|e| *e == Err(Error::NoConnection)));
    assert_eq!(client.pending_count(), 1);
    assert_eq!(new_server.outstanding(), Ok(1));

    client.teardown();
    assert_eq!(client.pending_count(), 0);
    assert_eq!(*counts.lock().unwrap(), vec![1, 1, 1, 1, 1]);
}

/// A wait already queued on the old channel must not re-arm the new one
#[test]
fn test_replace_channel_ignores_queued_wait() {
    let event_loop = Loop::new(LoopConfig::default());
    let (client_end, old_server) = Channel::create().unwrap();
    let events = Arc::new(Events::default());
    let handler: Arc<dyn EventHandler> = events.clone();
    let client = Client::bind(event_loop.dispatcher(), client_end, ClientConfig::default(), Some(handler)).unwrap();

    let event = TransactionHeader::new(0, EVENT, DynamicFlags::empty(), WireFormatVersion::V2);
    OutgoingMessage::encode(event, &mut 1u32)
        .unwrap()
        .write(&old_server)
        .unwrap();
    assert_eq!(event_loop.pending_waits(), 0);
    assert_eq!(event_loop.ready_count(), 1);

    let (fresh, new_server) = Channel::create().unwrap();
    assert!(client.replace_channel(fresh).unwrap().is_some());
    event_loop.run_until_idle().unwrap();
    assert_eq!(event_loop.pending_waits(), 1);
    assert_eq!(event_loop.ready_count(), 0);
    assert!(events.ordinals.lock().unwrap().is_empty());

    let event = TransactionHeader::new(0, EVENT + 1, DynamicFlags::empty(), WireFormatVersion::V2);
    OutgoingMessage::encode(event, &mut 2u32)
        .unwrap()
        .write(&new_server)
        .unwrap();
    event_loop.run_until_idle().unwrap();
    assert_eq!(*events.ordinals.lock().unwrap(), vec![EVENT + 1]);
    assert_eq!(event_loop.pending_waits(), 1);

    client.teardown();
    assert_eq!(event_loop.pending_waits(), 0);
}

#[test]
fn test_client_drop_fails_pending() {
    let event_loop = Loop::new(LoopConfig::default());
    let (client_end, _server_end) = Channel::create().unwrap();
    let client = Client::bind(event_loop.dispatcher(), client_end, ClientConfig::default(), None).unwrap();
    let results: Vec<_> = (0..3).map(|value| call_u32(&client, ECHO, value)).collect();

    drop(client);
    for result in &results {
        assert_eq!(taken(result), Some(Err(Error::NoConnection)));
    }
}

#[test]
fn test_call_sync_with_loop_thread() {
    let fx = fixture();
    let runner = fx.event_loop.clone();
    let worker = thread::spawn(move || runner.run());

    for value in 0..4u32 {
        let reply: u32 = fx.client.call_sync(ECHO, &mut { value }).unwrap();
        assert_eq!(reply, value);
    }

    fx.event_loop.quit();
    assert_eq!(worker.join().unwrap(), Status::Canceled);
}
