use meduce::testing::*;
use meduce::*;
use std::thread;
use std::time::{Duration, Instant};

type Counting = Process<usize, String, String, u64>;

fn word_count(lines: Vec<&str>) -> Counting {
    Process::new(
        Config::new()
            .with_natural_order()
            .with_mapper(|_: usize, line: String, out: &mut Emitter<String, u64>| {
                line.split_whitespace().for_each(|w| out.emit(w.to_string(), 1));
            })
            .with_reducer(reducers::Sum::<u64>::new())
            .with_producer(from_vec(lines.into_iter().map(String::from).collect()))
            .with_exec_mode(ExecMode::workers(2)),
    )
}

fn histogram() -> Process<String, u64, u64, u64, MapSink<u64, u64>> {
    Process::new(
        Config::new()
            .with_natural_order()
            .with_mapper(|_: String, n: u64, out: &mut Emitter<u64, u64>| out.emit(n, 1))
            .with_reducer(reducers::Sum::<u64>::new())
            .with_sink(MapSink::new())
            .with_exec_mode(ExecMode::workers(2)),
    )
}

fn misuse(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<MeduceError>(), Some(MeduceError::Misuse(_)))
}

fn wait_for_state<KI, VI, KO, VO, S>(
    process: &Process<KI, VI, KO, VO, S>,
    state: ProcessState,
) -> bool
where
    KI: Send + 'static,
    VI: Send + 'static,
    KO: Send + 'static,
    VO: Send + 'static,
    S: Sink<KO, VO> + 'static,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if process.state() == state {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn linked_processes_compose() -> anyhow::Result<()> {
    let words = word_count(vec!["a b c", "a b", "a", "d"]);
    let counts = histogram();
    link(&words, &counts, 1)?;

    words.start()?;
    assert!(words.wait()?.is_none());
    let sink = counts.wait()?.expect("downstream keeps its sink");

    // a:3, b:2, c:1, d:1
    assert_map_contents(&sink, [(3, 1), (2, 1), (1, 2)]);
    assert_eq!(words.state(), ProcessState::Finished);
    assert_eq!(counts.state(), ProcessState::Finished);
    assert_eq!(counts.stats().pairs_read, 4);
    Ok(())
}

#[test]
fn empty_upstream_ends_the_downstream_input() -> anyhow::Result<()> {
    let words = word_count(Vec::new());
    let counts = histogram();
    link_default(&words, &counts)?;

    words.start()?;
    words.wait()?;
    let sink = counts.wait()?.expect("sink");
    assert!(sink.is_empty());
    Ok(())
}

#[test]
fn full_handoff_queue_holds_the_upstream_back() -> anyhow::Result<()> {
    let (release, gate) = crossbeam_channel::bounded::<()>(0);

    let numbers = Process::new(
        Config::new()
            .with_natural_order()
            .with_mapper(|_: usize, n: u32, out: &mut Emitter<u32, u32>| out.emit(n, n))
            .with_reducer(reducers::First)
            .with_producer(from_vec((0..20u32).collect()))
            .with_exec_mode(ExecMode::workers(2)),
    );
    let recorder = RecordingSink::new();
    let slow = Process::new(
        Config::new()
            .with_natural_order()
            .with_mapper(move |k: u32, v: u32, out: &mut Emitter<u32, u32>| {
                // Blocks until `release` is dropped.
                let _ = gate.recv();
                out.emit(k, v);
            })
            .with_reducer(reducers::First)
            .with_sink(recorder.clone())
            .with_exec_mode(ExecMode::Sequential),
    );
    link(&numbers, &slow, 1)?;
    numbers.start()?;

    assert!(wait_for_state(&numbers, ProcessState::Reducing));
    assert!(wait_for_state(&slow, ProcessState::Mapping));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(numbers.state(), ProcessState::Reducing);

    drop(release);
    numbers.wait()?;
    slow.wait()?;
    assert_eq!(recorder.collect_calls(), 20);
    assert_eq!(numbers.stats().collections, 20);
    Ok(())
}

#[test]
fn upstream_mapping_failure_cancels_the_downstream() -> anyhow::Result<()> {
    let broken = Process::new(
        Config::new()
            .with_natural_order()
            .with_mapper(|_: usize, v: u32, out: &mut Emitter<u32, u32>| {
                if v == 3 {
                    panic!("bad record");
                }
                out.emit(v, v);
            })
            .with_reducer(reducers::First)
            .with_producer(from_vec(vec![1u32, 2, 3, 4])),
    );
    let recorder = RecordingSink::new();
    let after = Process::new(
        Config::new()
            .with_natural_order()
            .with_mapper(|k: u32, v: u32, out: &mut Emitter<u32, u32>| out.emit(k, v))
            .with_reducer(reducers::First)
            .with_sink(recorder.clone()),
    );
    link_default(&broken, &after)?;
    broken.start()?;

    let err = broken.wait().err().expect("upstream fails");
    assert!(matches!(
        err.downcast_ref::<MeduceError>(),
        Some(MeduceError::Callable {
            stage: Stage::Mapper,
            ..
        })
    ));
    let err = after.wait().err().expect("downstream is cancelled");
    assert!(is_cancelled(&err));
    assert_eq!(after.state(), ProcessState::Failed);
    assert_eq!(recorder.finalize_calls(), 0);
    Ok(())
}

#[test]
fn upstream_reducing_failure_cancels_the_running_downstream() -> anyhow::Result<()> {
    let broken = Process::new(
        Config::new()
            .with_natural_order()
            .with_mapper(|_: usize, v: u32, out: &mut Emitter<u32, u32>| out.emit(v, v))
            .with_reducer(reducers::First)
            .with_finalizer(|k: &u32, _: &mut u32| {
                if *k == 50 {
                    panic!("cannot finalize");
                }
            })
            .with_producer(from_vec((0..100u32).collect()))
            .with_exec_mode(ExecMode::Sequential),
    );
    let after = Process::new(
        Config::new()
            .with_natural_order()
            .with_mapper(|k: u32, v: u32, out: &mut Emitter<u32, u32>| out.emit(k, v))
            .with_reducer(reducers::First)
            .with_sink(MapSink::new()),
    );
    link(&broken, &after, 4)?;
    broken.start()?;

    let err = broken.wait().err().expect("upstream fails");
    assert!(matches!(
        err.downcast_ref::<MeduceError>(),
        Some(MeduceError::Callable {
            stage: Stage::Finalizer,
            ..
        })
    ));
    // Whatever arrived before the failure must not surface as a result.
    let err = after.wait().err().expect("downstream must not finish on partial input");
    assert!(is_cancelled(&err));
    Ok(())
}

#[test]
fn cancelling_the_upstream_reaches_the_downstream() -> anyhow::Result<()> {
    let (feed, input) = channel_source::<usize, String>(1);
    let words = Process::new(
        Config::new()
            .with_natural_order()
            .with_mapper(|_: usize, line: String, out: &mut Emitter<String, u64>| {
                out.emit(line, 1);
            })
            .with_reducer(reducers::Sum::<u64>::new())
            .with_producer(input),
    );
    let counts = histogram();
    link_default(&words, &counts)?;
    words.start()?;
    feed.send((0, "hello".to_string()))?;

    words.cancel();
    assert!(is_cancelled(&words.wait().err().expect("cancelled")));
    assert!(is_cancelled(&counts.wait().err().expect("cancelled")));
    drop(feed);
    Ok(())
}

#[test]
fn linking_requires_fresh_processes() -> anyhow::Result<()> {
    let words = word_count(vec!["x"]);
    let counts = histogram();
    let other = histogram();

    let err = link(&words, &counts, 0).unwrap_err();
    assert!(matches!(err.downcast_ref::<MeduceError>(), Some(MeduceError::Config(_))));

    link(&words, &counts, 2)?;
    assert!(misuse(&link(&words, &other, 2).unwrap_err()));

    let more_words = word_count(vec!["y"]);
    assert!(misuse(&link(&more_words, &counts, 2).unwrap_err()));

    assert!(misuse(&counts.start().unwrap_err()));

    words.start()?;
    words.wait()?;
    counts.wait()?;

    assert!(misuse(&words.wait().unwrap_err()));
    assert!(misuse(&link(&word_count(vec![]), &counts, 1).unwrap_err()));
    Ok(())
}

#[test]
fn a_process_cannot_feed_itself() {
    let echo: Process<u32, u32, u32, u32, MapSink<u32, u32>> = Process::new(
        Config::new()
            .with_natural_order()
            .with_mapper(|k: u32, v: u32, out: &mut Emitter<u32, u32>| out.emit(k, v))
            .with_reducer(reducers::First)
            .with_sink(MapSink::new()),
    );
    assert!(misuse(&link(&echo, &echo, 1).unwrap_err()));
}

#[test]
fn chains_of_three_processes() -> anyhow::Result<()> {
    let words = word_count(vec!["a a a b b c", "c c d"]);
    let counts = histogram();
    let total = Process::new(
        Config::new()
            .with_natural_order()
            .with_mapper(|words_with_count: u64, n: u64, out: &mut Emitter<&'static str, u64>| {
                out.emit("words", words_with_count * n);
            })
            .with_reducer(reducers::Sum::<u64>::new())
            .with_sink(SingleValueSink::new()),
    );
    // A linked upstream's sink is ignored, so `counts` keeps its MapSink type.
    link(&words, &counts, 2)?;
    link(&counts, &total, 2)?;

    words.start()?;
    words.wait()?;
    assert!(counts.wait()?.is_none());
    let sink = total.wait()?.expect("sink");
    assert_eq!(sink.get(&"words")?, &9);
    Ok(())
}
