//! End-to-end client runs against an in-process calling-context service.

use std::cell::Cell;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use icount::{
    BacktraceRenderer, BacktraceRequest, Category, CategoryFlags, Client, ClientConfig,
    ContextHandle, ContextProvider, RankedContext, SiteSlot,
};

const SEPARATOR: &str = icount_report::SEPARATOR;

/// Contexts are fixed per thread; the service has issued `max` handles.
struct Service {
    max: ContextHandle,
}

impl ContextProvider for Service {
    type Thread = Cell<ContextHandle>;

    fn current_handle(&self, thread: &Self::Thread, _slot: SiteSlot) -> ContextHandle {
        thread.get()
    }

    fn max_handle(&self) -> ContextHandle {
        self.max
    }
}

impl BacktraceRenderer for Service {
    fn render(&self, handle: ContextHandle, request: BacktraceRequest) -> String {
        format!("fn_{handle} (depth {})\nmain\n", request.max_depth)
    }
}

fn start(dir: &Path, max: ContextHandle) -> Client<Service> {
    let config = ClientConfig::new(dir).with_capacity(1024);
    Client::init(config, Service { max }).expect("client init")
}

fn run(client: &Client<Service>, handle: ContextHandle, flags: CategoryFlags, times: u64) {
    let thread = Cell::new(handle);
    let site = client.instrument(0, flags);
    for _ in 0..times {
        client.on_execute(&thread, site);
    }
}

const fn ctx(handle: ContextHandle, count: u64) -> RankedContext {
    RankedContext { handle, count }
}

fn entry(rank: usize, count: u64, handle: ContextHandle) -> String {
    let trace = format!("fn_{handle} (depth 10)\nmain\n");
    format!("[NO. {rank}]Ins Call times {count}\n{SEPARATOR}\n{trace}{SEPARATOR}\n\n\n")
}

#[test]
fn example_scenario_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = start(dir.path(), 5);
    run(&client, 1, CategoryFlags::LOAD, 5);
    run(&client, 3, CategoryFlags::LOAD, 9);
    run(&client, 4, CategoryFlags::LOAD, 2);

    let summary = client.exit().expect("exit");
    assert_eq!(summary.total(Category::MemoryLoad), 16);
    assert_eq!(
        summary.reported(Category::MemoryLoad),
        [ctx(3, 9), ctx(1, 5), ctx(4, 2)]
    );

    let text = fs::read_to_string(&summary.path).expect("read report");
    let expected = format!(
        "MEMORY LOAD : 16\n{}{}{}\
         MEMORY STORE : 0\n\
         CONDITIONAL BRANCHES : 0\n\
         UNCONDITIONAL_BRANCHES : 0\n",
        entry(1, 9, 3),
        entry(2, 5, 1),
        entry(3, 2, 4),
    );
    assert_eq!(text, expected);
}

#[test]
fn empty_run_writes_four_headers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let summary = start(dir.path(), 0).exit().expect("exit");

    let text = fs::read_to_string(&summary.path).expect("read report");
    let expected = "MEMORY LOAD : 0\n\
                    MEMORY STORE : 0\n\
                    CONDITIONAL BRANCHES : 0\n\
                    UNCONDITIONAL_BRANCHES : 0\n";
    assert_eq!(text, expected);
    assert!(Category::ALL.iter().all(|&c| summary.reported(c).is_empty()));
}

#[test]
fn multi_category_instruction_counts_in_each() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = start(dir.path(), 8);
    // A load-and-store instruction, e.g. a memory-to-memory move.
    run(&client, 2, CategoryFlags::LOAD | CategoryFlags::STORE, 3);
    run(&client, 6, CategoryFlags::COND_BRANCH, 4);
    run(&client, 7, CategoryFlags::NONE, 100);

    let summary = client.exit().expect("exit");
    assert_eq!(summary.total(Category::MemoryLoad), 3);
    assert_eq!(summary.total(Category::MemoryStore), 3);
    assert_eq!(summary.total(Category::ConditionalBranch), 4);
    assert_eq!(summary.total(Category::UnconditionalBranch), 0);
    assert_eq!(summary.reported(Category::MemoryStore), [ctx(2, 3)]);
}

#[test]
fn report_keeps_ten_hottest_contexts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = start(dir.path(), 64);
    for handle in 1..64 {
        let times = u64::from(handle);
        run(&client, handle, CategoryFlags::UNCOND_BRANCH, times);
    }

    let summary = client.exit().expect("exit");
    let handles: Vec<_> = summary
        .reported(Category::UnconditionalBranch)
        .iter()
        .map(|r| r.handle)
        .collect();
    assert_eq!(handles, (54..64).rev().collect::<Vec<_>>());
    let total: u64 = (1..64).sum();
    assert_eq!(summary.total(Category::UnconditionalBranch), total);

    let text = fs::read_to_string(&summary.path).expect("read report");
    assert!(text.contains("[NO. 10]Ins Call times 54\n"));
    assert!(!text.contains("[NO. 11]"));
}

#[test]
fn contexts_beyond_max_handle_are_not_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = start(dir.path(), 4);
    run(&client, 2, CategoryFlags::LOAD, 1);
    run(&client, 9, CategoryFlags::LOAD, 50);

    let summary = client.exit().expect("exit");
    assert_eq!(summary.total(Category::MemoryLoad), 51);
    assert_eq!(summary.reported(Category::MemoryLoad), [ctx(2, 1)]);
}

/// Thread-shared service: every thread runs under its own context.
struct PerThread;

impl ContextProvider for PerThread {
    type Thread = ContextHandle;

    fn current_handle(&self, thread: &Self::Thread, _slot: SiteSlot) -> ContextHandle {
        *thread
    }

    fn max_handle(&self) -> ContextHandle {
        16
    }
}

impl BacktraceRenderer for PerThread {
    fn render(&self, handle: ContextHandle, _request: BacktraceRequest) -> String {
        format!("thread_{handle}\n")
    }
}

#[test]
fn threads_counting_distinct_contexts_are_exact() {
    const ITERS: u64 = 10_000;

    let dir = tempfile::tempdir().expect("tempdir");
    let config = ClientConfig::new(dir.path()).with_capacity(16);
    let client = Arc::new(Client::init(config, PerThread).expect("client init"));
    let workers: Vec<_> = (1..=4)
        .map(|handle: ContextHandle| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                let site = client.instrument(0, CategoryFlags::LOAD);
                for _ in 0..ITERS {
                    client.on_execute(&handle, site);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    let client = Arc::into_inner(client).expect("workers joined");
    for handle in 1..=4 {
        assert_eq!(client.store().count(Category::MemoryLoad, handle), ITERS);
    }
    let summary = client.exit().expect("exit");
    assert_eq!(summary.reported(Category::MemoryLoad).len(), 4);
}
