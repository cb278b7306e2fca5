//! Sessions driven end to end against a scripted backend

pub mod fake;

mod breakpoints;
mod inspect;
mod run;

use std::path::Path;
use std::sync::Arc;

use debugcat::debugger::status::StatusSubscriber;
use debugcat::{Debugger, Mode, OutputReceiver, OutputSink, SessionParams, Status, StatusBus};

use fake::{FakeBackend, Script};

pub struct Harness {
    pub dbg: Debugger,
    pub fake: FakeBackend,
    pub status: StatusSubscriber,
    pub out: OutputReceiver,
}

impl Harness {
    /// Controller around a fresh fake, not started yet
    pub fn new(mode: Mode, setup: impl FnOnce(&mut Script)) -> Self {
        let fake = FakeBackend::new();
        setup(&mut fake.script());
        let bus = StatusBus::new();
        let status = bus.subscribe();
        let mut params = SessionParams::new(mode, bus);
        if mode == Mode::Attach {
            params.pid = Some(fake.script().pid);
        }
        let (sink, out) = OutputSink::channel();
        let dbg = Debugger::new(Arc::new(fake.clone()), params, sink, None);
        Self { dbg, fake, status, out }
    }

    /// Controller that already reached `Ready`
    pub async fn started(mode: Mode, setup: impl FnOnce(&mut Script)) -> Self {
        let mut h = Self::new(mode, setup);
        h.dbg.start(Path::new("/p/main.go")).await.unwrap();
        assert_eq!(h.dbg.status(), Status::Ready);
        h.status.drain();
        h.out.drain();
        h
    }

    /// Output lines written since the last call
    pub fn lines(&mut self) -> Vec<String> {
        self.out.drain().into_iter().map(|l| l.text).collect()
    }
}
