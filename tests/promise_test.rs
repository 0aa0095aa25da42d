#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use promise_chain::{await_promise, spawn, Error, Promise, State};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::{thread, time::Duration};

    #[test]
    fn then_chain_on_success() {
        let promise = spawn(|| Ok(10)).then(|x| x * 2).then(|x| x + 5);
        assert_eq!(promise.wait().unwrap(), 25);
    }

    #[test]
    fn executor_rejects_with_message() {
        let promise = Promise::<i32>::new(|resolver| resolver.reject(Error::msg("fail")));
        let err = promise.wait().unwrap_err();
        assert_eq!(err.to_string(), "fail");
        assert!(!err.is_panic());
    }

    #[test]
    fn then_promise_flattens() {
        let promise = spawn(|| Ok(2)).then_promise(|v| spawn(move || Ok(v * v)));
        assert_eq!(promise.wait().unwrap(), 4);
    }

    #[test]
    fn then_on_failure_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let promise = spawn(|| Err::<i32, _>(Error::msg("e")))
            .then(move |x| {
                counted.fetch_add(1, Ordering::SeqCst);
                x
            })
            .then_promise(Promise::resolved);
        assert_eq!(promise.wait().unwrap_err().to_string(), "e");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn catch_recovers() {
        let promise = spawn(|| Err::<i32, _>(Error::msg("e"))).catch(|_| Ok(100));
        assert_eq!(promise.wait().unwrap(), 100);
    }

    #[test]
    fn catch_passes_success_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let promise = spawn(|| Ok(5)).catch(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        });
        assert_eq!(promise.wait().unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn executor_panic_is_contained() {
        let promise = Promise::<i32>::new(|_resolver| panic!("boom"));
        let err = promise.wait().unwrap_err();
        assert!(err.is_panic());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn wait_is_repeatable() {
        let promise = spawn(|| Err::<String, _>(Error::msg("once")));
        let outcomes: Vec<_> = (0..3)
            .map(|_| promise.wait().unwrap_err().to_string())
            .collect();
        assert_eq!(outcomes, vec!["once", "once", "once"]);
        assert_eq!(promise.state(), State::Rejected);
    }

    #[test]
    fn first_settlement_wins_across_threads() {
        let promise = Promise::<usize>::pending();
        let barrier = Arc::new(Barrier::new(6));
        let settled = Arc::new(AtomicUsize::new(0));
        let racers: Vec<_> = (0..6)
            .map(|i| {
                let resolver = promise.resolver();
                let barrier = barrier.clone();
                let settled = settled.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let won = if i % 2 == 0 {
                        resolver.try_resolve(i).is_ok()
                    } else {
                        resolver.try_reject(Error::msg(i)).is_ok()
                    };
                    if won {
                        settled.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for racer in racers {
            racer.join().expect("The racer thread has panicked");
        }
        assert_eq!(settled.load(Ordering::SeqCst), 1);
        let first = promise.try_get().expect("promise should be settled");
        let again = promise.wait();
        assert_eq!(first.is_ok(), again.is_ok());
    }

    #[test]
    fn derived_promise_waits_for_slow_parent() {
        let promise = Promise::new(|resolver| {
            thread::sleep(Duration::from_millis(100));
            resolver.resolve(String::from("🍓"));
        });
        let derived = promise.then(|s| s.len());
        assert_eq!(derived.state(), State::Pending);
        assert_eq!(derived.wait().unwrap(), "🍓".len());
    }

    #[test]
    fn long_chain_settles() {
        let mut promise = spawn(|| Ok(0u64));
        for _ in 0..64 {
            promise = promise.then(|x| x + 1);
        }
        assert_eq!(await_promise(&promise).unwrap(), 64);
    }

    #[test]
    fn rejection_crosses_a_long_then_chain() {
        let root = Promise::<u64>::pending();
        let mut promise = root.then(|x| x + 1);
        for _ in 1..100_000 {
            promise = promise.then(|x| x + 1);
        }
        root.reject(Error::msg("e"));
        assert_eq!(promise.wait().unwrap_err().to_string(), "e");
    }

    #[test]
    fn value_crosses_a_long_catch_chain() {
        let root = Promise::<u64>::pending();
        let mut promise = root.catch(Err);
        for _ in 1..100_000 {
            promise = promise.catch(Err);
        }
        root.resolve(7);
        assert_eq!(promise.wait().unwrap(), 7);
    }

    #[test]
    fn catch_after_panic_recovers() {
        let promise = spawn(|| Ok(1))
            .then(|_: i32| -> i32 { panic!("boom") })
            .catch(|err| if err.is_panic() { Ok(-1) } else { Err(err) });
        assert_eq!(promise.wait().unwrap(), -1);
    }

    #[test]
    fn await_from_async_code() {
        let promise = spawn(|| Ok(6)).then_promise(|x| spawn(move || Ok(x * 7)));
        let waiter = thread::spawn(move || block_on(async { promise.await }));
        let outcome = waiter.join().expect("The waiter thread has panicked");
        assert_eq!(outcome.unwrap(), 42);
    }

    #[test]
    fn deferred_promise_resolved_later() {
        let promise = Promise::<i32>::default();
        let resolver = promise.resolver();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            resolver.resolve(42);
        });

        assert_eq!(promise.wait().unwrap(), 42);
        assert!(promise.is_settled());
    }
}
