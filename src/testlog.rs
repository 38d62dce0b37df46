// src/testlog.rs
// 测试用日志捕获: 每个测试线程只看到自己线程上产生的记录
use std::cell::RefCell;
use std::sync::Once;

use log::{Level, LevelFilter, Log, Metadata, Record};

thread_local! {
    static RECORDS: RefCell<Vec<(Level, String)>> = RefCell::new(Vec::new());
}

struct ThreadCapture;

impl Log for ThreadCapture {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        RECORDS.with(|r| {
            r.borrow_mut()
                .push((record.level(), record.args().to_string()))
        });
    }

    fn flush(&self) {}
}

static LOGGER: ThreadCapture = ThreadCapture;
static INSTALL: Once = Once::new();

/// Runs `f` and returns what it logged on the current thread.
pub fn capture<T>(f: impl FnOnce() -> T) -> (T, Vec<(Level, String)>) {
    INSTALL.call_once(|| {
        log::set_logger(&LOGGER).ok();
        log::set_max_level(LevelFilter::Trace);
    });
    RECORDS.with(|r| r.borrow_mut().clear());
    let out = f();
    let records = RECORDS.with(|r| r.borrow_mut().drain(..).collect());
    (out, records)
}

pub fn count(records: &[(Level, String)], level: Level) -> usize {
    records.iter().filter(|(l, _)| *l == level).count()
}
