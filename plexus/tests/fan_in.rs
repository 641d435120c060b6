// tests/fan_in.rs

mod common;
use common::*;

use plexus::{fan_in, queue, ErasedQueue, FanInBuilder, Queue, RecvTimeoutError, Value};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn two_inputs_deliver_both_then_close() {
  let a = queue::bounded::<Value>(0);
  let b = queue::bounded::<Value>(0);
  let pa = sleep_send_close(a.clone(), Value::new("Hello"), Duration::from_millis(50));
  let pb = sleep_send_close(b.clone(), Value::new("Goodbye"), Duration::from_millis(150));

  let merged = fan_in(2, vec![a.erase(), b.erase()]).unwrap();
  let got = drain_within(merged.output(), LONG_TIMEOUT);
  let words: Vec<&str> = got.iter().filter_map(|v| v.downcast_ref::<&str>().copied()).collect();
  assert_eq!(words, vec!["Hello", "Goodbye"]);

  pa.join().unwrap();
  pb.join().unwrap();
  assert!(finished_within(merged.session(), SHORT_TIMEOUT));
  assert_eq!(merged.stop(), Ok(()));
}

#[test]
fn cancel_closes_output_while_inputs_are_open() {
  let a = queue::bounded::<&str>(1);
  let b = queue::bounded::<&str>(1);
  let pa = sleep_send_close(a.clone(), "Hello", Duration::from_millis(20));
  let pb = sleep_send_close(b.clone(), "Goodbye", Duration::from_millis(400));

  let merged = fan_in(2, vec![a.clone(), b.clone()]).unwrap();
  assert_eq!(merged.output().recv_timeout(LONG_TIMEOUT), Ok("Hello"));
  assert!(merged.cancel());
  assert_eq!(
    merged.output().recv_timeout(SHORT_TIMEOUT),
    Err(RecvTimeoutError::Closed)
  );
  assert!(finished_within(merged.session(), SHORT_TIMEOUT));

  // The session never closes or drains its inputs on cancellation.
  pa.join().unwrap();
  pb.join().unwrap();
  assert_eq!(b.recv(), Ok("Goodbye"));
  assert_eq!(merged.stop(), Ok(()));
}

#[test]
fn zero_inputs_give_an_already_closed_output() {
  let merged = fan_in(1, Vec::<ErasedQueue>::new()).unwrap();
  assert!(merged.output().is_closed());
  assert!(merged.output().try_recv().is_err());
  assert!(merged.session().is_finished());
}

#[test]
fn one_input_keeps_order_across_pauses() {
  let input = queue::bounded::<&str>(1);
  let producer = {
    let input = input.clone();
    thread::spawn(move || {
      input.send("Hello").unwrap();
      thread::sleep(Duration::from_millis(100));
      input.send("Goodbye").unwrap();
      input.close().unwrap();
    })
  };
  let merged = fan_in(2, vec![input]).unwrap();
  assert_eq!(drain_within(merged.output(), LONG_TIMEOUT), vec!["Hello", "Goodbye"]);
  producer.join().unwrap();
  assert_eq!(merged.stop(), Ok(()));
}

#[test]
fn per_input_order_is_preserved() {
  let inputs: Vec<Queue<(usize, usize)>> = (0..4).map(|_| queue::bounded(4)).collect();
  let producers: Vec<_> = inputs
    .iter()
    .cloned()
    .enumerate()
    .map(|(id, q)| {
      thread::spawn(move || {
        for seq in 0..ITEMS_MEDIUM {
          q.send((id, seq)).unwrap();
        }
        q.close().unwrap();
      })
    })
    .collect();

  let merged = FanInBuilder::new()
    .capacity(8)
    .thread_name("fan-in-order")
    .spawn(inputs)
    .unwrap();
  let got = drain_within(merged.output(), LONG_TIMEOUT);
  assert_eq!(got.len(), 4 * ITEMS_MEDIUM);

  let mut next = [0usize; 4];
  for (id, seq) in got {
    assert_eq!(seq, next[id], "input {} out of order", id);
    next[id] += 1;
  }
  for p in producers {
    p.join().unwrap();
  }
  assert_eq!(merged.stop(), Ok(()));
}

#[test]
fn heterogeneous_erased_inputs() {
  let words = queue::bounded::<String>(1);
  let numbers = queue::bounded::<i64>(1);
  let flags = queue::unbounded::<bool>();
  let merged = fan_in(
    0,
    vec![words.erase(), numbers.erase(), flags.erase()],
  )
  .unwrap();

  let producers = vec![
    sleep_send_close(words, "Hello".to_string(), Duration::from_millis(10)),
    sleep_send_close(numbers, -7, Duration::from_millis(20)),
    sleep_send_close(flags, true, Duration::from_millis(30)),
  ];

  let got = drain_within(merged.output(), LONG_TIMEOUT);
  let kinds: HashSet<&str> = got.iter().map(Value::type_name).collect();
  assert_eq!(got.len(), 3);
  assert_eq!(kinds.len(), 3);
  assert!(got.iter().any(|v| v.downcast_ref::<String>().map(String::as_str) == Some("Hello")));
  assert!(got.iter().any(|v| v.downcast_ref::<i64>() == Some(&-7)));
  assert!(got.iter().any(|v| v.downcast_ref::<bool>() == Some(&true)));

  for p in producers {
    p.join().unwrap();
  }
  assert_eq!(merged.stop(), Ok(()));
}

#[test]
fn items_merged_before_cancel_stay_receivable() {
  let a = queue::unbounded::<u32>();
  let b = queue::unbounded::<u32>();
  a.send(1).unwrap();
  b.send(2).unwrap();
  let merged = fan_in(4, vec![a.clone(), b.clone()]).unwrap();

  // Wait until both items made it into the output.
  let deadline = std::time::Instant::now() + LONG_TIMEOUT;
  while merged.output().len() < 2 {
    assert!(std::time::Instant::now() < deadline, "items were not merged");
    thread::sleep(Duration::from_millis(1));
  }
  let (output, canceller, session) = merged.into_parts();
  assert!(canceller.cancel());
  assert_eq!(session.join(), Ok(()));

  let mut got = drain_within(&output, SHORT_TIMEOUT);
  got.sort_unstable();
  assert_eq!(got, vec![1, 2]);
}

#[test]
fn cancel_is_one_shot_and_safe_from_many_threads() {
  let a = queue::bounded::<u8>(0);
  let b = queue::bounded::<u8>(0);
  let merged = fan_in(0, vec![a, b]).unwrap();
  let barrier = Arc::new(Barrier::new(8));
  let handles: Vec<_> = (0..8)
    .map(|_| {
      let canceller = merged.canceller().clone();
      let barrier = barrier.clone();
      thread::spawn(move || {
        barrier.wait();
        canceller.cancel()
      })
    })
    .collect();
  let fired = handles
    .into_iter()
    .map(|h| h.join().unwrap())
    .filter(|fired| *fired)
    .count();
  assert_eq!(fired, 1);
  assert!(merged.canceller().is_cancelled());
  assert_eq!(merged.stop(), Ok(()));
}

#[test]
fn output_closed_by_consumer_ends_session() {
  let a = queue::unbounded::<u32>();
  let b = queue::unbounded::<u32>();
  let merged = fan_in(1, vec![a.clone(), b.clone()]).unwrap();
  merged.output().close().unwrap();
  a.send(1).unwrap();
  assert!(finished_within(merged.session(), LONG_TIMEOUT));
  assert_eq!(merged.stop(), Ok(()));
}

/// Races cancellation against the closing of the last live input. Whichever
/// wins, the output must end up closed, the session must exit, and every item
/// that reached the output must be one that was sent.
#[test]
fn cancel_racing_last_input_close() {
  let deadline = std::time::Instant::now() + STRESS_TIMEOUT;
  for round in 0..ITEMS_MEDIUM {
    assert!(std::time::Instant::now() < deadline, "stress run too slow");
    let k = 1 + round % 3;
    let inputs: Vec<Queue<usize>> = (0..k).map(|_| queue::bounded(1)).collect();
    for q in &inputs[1..] {
      q.close().unwrap();
    }
    let last = inputs[0].clone();
    let merged = fan_in(ITEMS_LOW, inputs).unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let closer = {
      let barrier = barrier.clone();
      thread::spawn(move || {
        last.send(round).unwrap();
        barrier.wait();
        last.close().unwrap();
      })
    };
    let canceller = merged.canceller().clone();
    let cancel = thread::spawn(move || {
      barrier.wait();
      canceller.cancel()
    });

    closer.join().unwrap();
    assert!(cancel.join().unwrap());

    let got = drain_within(merged.output(), LONG_TIMEOUT);
    assert!(got.is_empty() || got == vec![round]);
    assert!(merged.output().is_closed());
    assert!(merged.output().close().is_err());
    assert!(finished_within(merged.session(), LONG_TIMEOUT), "round {} leaked", round);
    assert_eq!(merged.stop(), Ok(()));
  }
}

#[test]
fn many_sessions_all_exit() {
  let sessions: Vec<_> = (0..ITEMS_LOW)
    .map(|i| {
      let inputs: Vec<Queue<usize>> = (0..(i % 5)).map(|_| queue::unbounded()).collect();
      for q in &inputs {
        q.send(i).unwrap();
        q.close().unwrap();
      }
      (i % 5, fan_in(i % 5, inputs).unwrap())
    })
    .collect();

  for (k, merged) in sessions {
    let got = drain_within(merged.output(), LONG_TIMEOUT);
    assert_eq!(got.len(), k);
    assert!(finished_within(merged.session(), LONG_TIMEOUT));
    assert_eq!(merged.stop(), Ok(()));
  }
}
