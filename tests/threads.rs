//! Reactor lifecycle across modes, calls from foreign threads, and the
//! restorer deprecation warning.

mod common;

use common::{exclusive_reactor_access, test_interface, ValueServer};

use capwire::{restore_client, Client, Error, Reactor, Restorer, Value};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

#[test]
fn reactor_lifecycle_cycles() {
    let _guard = exclusive_reactor_access();

    for _ in 0..2 {
        let reactor = Reactor::enter().expect("cooperative reactor");
        drop(reactor);
    }
    for _ in 0..2 {
        let reactor = Reactor::enter_threaded().expect("threaded reactor");
        drop(reactor);
    }
    // Modes can be mixed across cycles.
    let reactor = Reactor::enter().expect("cooperative again");
    drop(reactor);
}

#[test]
fn threaded_reactor_serves_calls_from_other_threads() {
    let _guard = exclusive_reactor_access();
    let reactor = Reactor::enter_threaded().expect("threaded reactor");
    let client = Client::local(reactor.handle(), test_interface(), ValueServer::default());

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let client = client.clone();
            thread::spawn(move || {
                let response = client
                    .call("foo")
                    .expect("call")
                    .arg("i", Value::Int(5))
                    .expect("i")
                    .send()
                    .expect("send")
                    .wait()
                    .expect("response");
                response.get_text("x").expect("x").to_string()
            })
        })
        .collect();

    for worker in workers {
        assert_eq!(worker.join().expect("worker"), "26");
    }
}

#[test]
fn threaded_timer_fires_without_a_pumping_waiter() {
    let _guard = exclusive_reactor_access();
    let reactor = Reactor::enter_threaded().expect("threaded reactor");

    let value = reactor
        .timer()
        .after_delay(Duration::from_millis(20))
        .then_void(|| Ok(11))
        .wait()
        .expect("timer");
    assert_eq!(value, 11);
}

#[derive(Clone)]
struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CaptureWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

struct TagRestorer {
    reactor: capwire::ReactorHandle,
}

impl Restorer for TagRestorer {
    fn restore(&self, ref_id: &Value) -> capwire::Result<Client> {
        match ref_id.as_text() {
            Some("testInterface") => Ok(Client::local(
                &self.reactor,
                test_interface(),
                ValueServer::new(100),
            )),
            _ => Err(Error::failed(format!("unknown sturdy ref `{ref_id}`"))),
        }
    }
}

#[test]
fn restoring_warns_once_and_yields_a_live_capability() {
    let _guard = exclusive_reactor_access();
    let reactor = Reactor::enter_threaded().expect("threaded reactor");

    let buffer = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_writer(CaptureWriter(buffer.clone()))
        .with_ansi(false)
        .finish();

    let restorer = TagRestorer {
        reactor: reactor.handle().clone(),
    };
    let client = tracing::subscriber::with_default(subscriber, || {
        restore_client(&restorer, &Value::text("testInterface")).expect("restore")
    });

    let output = String::from_utf8(buffer.lock().clone()).expect("utf8 log output");
    assert_eq!(output.matches("Restorers are deprecated.").count(), 1);

    let response = client
        .call("foo")
        .expect("call")
        .arg("i", Value::Int(5))
        .expect("i")
        .send()
        .expect("send")
        .wait()
        .expect("response");
    assert_eq!(response.get_text("x").expect("x"), "125");
}

#[test]
fn unknown_sturdy_ref_is_rejected() {
    let _guard = exclusive_reactor_access();
    let reactor = Reactor::enter().expect("reactor");

    let restorer = TagRestorer {
        reactor: reactor.handle().clone(),
    };
    let err = restore_client(&restorer, &Value::text("nope")).expect_err("unknown ref");
    assert!(err.message().expect("msg").contains("nope"));
}
