mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use relay_runtime::{Converted, Invocation, Message, PoolStats, XPathEvaluator};
use relay_xpath::{CallCtx, Error, FunctionImpl, FunctionRegistry, SimpleNode, XdmAtomicValue, XdmItem, XdmSequence, xml};
use rstest::rstest;

const THREADS: usize = 8;

fn function<F>(f: F) -> FunctionImpl<SimpleNode>
where
    F: Fn(&CallCtx<'_, SimpleNode>, &[XdmSequence<SimpleNode>]) -> Result<XdmSequence<SimpleNode>, Error>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// `rendezvous()` blocks until `parties` evaluations are inside the expression at once.
fn rendezvous_evaluator(source: &str, parties: usize) -> XPathEvaluator {
    let barrier = Arc::new(Barrier::new(parties));
    let mut registry = FunctionRegistry::new();
    registry.register_local(
        "rendezvous",
        0,
        function(move |_, _| {
            barrier.wait();
            Ok(vec![XdmItem::Atomic(XdmAtomicValue::Boolean(true))])
        }),
    );
    XPathEvaluator::builder(source).boolean_result().function_resolver(Arc::new(registry)).build()
}

fn numbered(i: usize) -> Invocation {
    let body = xml::parse_document(&format!("<n>{i}</n>")).expect("document");
    Invocation::new(Message::new(body).with_header("id", i.to_string()))
}

#[rstest]
fn simultaneous_evaluations_hold_distinct_instances() {
    common::init_tracing();
    let evaluator = rendezvous_evaluator("rendezvous() and /n >= 0", THREADS);

    thread::scope(|s| {
        for i in 0..THREADS {
            let evaluator = &evaluator;
            s.spawn(move || assert!(evaluator.matches(&numbered(i)).unwrap()));
        }
    });

    assert_eq!(
        evaluator.pool_stats(),
        PoolStats { idle: THREADS, checked_out: 0, created: THREADS, high_water: THREADS }
    );
}

#[rstest]
fn sequential_rounds_reuse_the_grown_pool() {
    let evaluator = rendezvous_evaluator("rendezvous()", THREADS);

    for _ in 0..3 {
        thread::scope(|s| {
            for i in 0..THREADS {
                let evaluator = &evaluator;
                s.spawn(move || evaluator.matches(&numbered(i)).unwrap());
            }
        });
    }

    let stats = evaluator.pool_stats();
    assert_eq!(stats.created, THREADS);
    assert_eq!(stats.idle, stats.high_water);
}

#[rstest]
fn body_sees_only_the_calling_threads_invocation() {
    common::init_tracing();
    let evaluator = Arc::new(XPathEvaluator::builder("string(body()/n)").string_result().build());
    let predicate = Arc::new(XPathEvaluator::builder("body()/n = header('id')").boolean_result().build());
    let start = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let evaluator = Arc::clone(&evaluator);
            let predicate = Arc::clone(&predicate);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let invocation = numbered(i);
                start.wait();
                for _ in 0..200 {
                    assert_eq!(evaluator.evaluate(&invocation).unwrap(), Converted::Text(i.to_string()));
                    assert!(predicate.matches(&invocation).unwrap());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker panicked");
    }

    assert_eq!(evaluator.pool_stats().checked_out, 0);
    assert!(evaluator.pool_stats().created <= THREADS);
}

#[rstest]
fn evaluators_are_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<XPathEvaluator>();
    assert_send_sync::<Invocation>();
}

#[rstest]
fn shutdown_while_an_evaluation_is_running() {
    let checkpoint = Arc::new(Barrier::new(2));
    let mut registry = FunctionRegistry::new();
    let inside = Arc::clone(&checkpoint);
    registry.register_local(
        "pause",
        0,
        function(move |_, _| {
            inside.wait();
            inside.wait();
            Ok(vec![XdmItem::Atomic(XdmAtomicValue::Boolean(true))])
        }),
    );
    let evaluator = XPathEvaluator::builder("pause()").boolean_result().function_resolver(Arc::new(registry)).build();

    thread::scope(|s| {
        let running = s.spawn(|| evaluator.matches(&numbered(1)));
        checkpoint.wait();
        evaluator.shutdown();
        checkpoint.wait();
        assert!(running.join().unwrap().unwrap());
    });

    assert!(evaluator.is_shutdown());
    assert_eq!(evaluator.pool_stats().idle, 0);
    assert_eq!(evaluator.pool_stats().checked_out, 0);
    let err = evaluator.matches(&numbered(3)).unwrap_err();
    assert!(matches!(err, relay_runtime::EvaluatorError::Shutdown { .. }));
}
