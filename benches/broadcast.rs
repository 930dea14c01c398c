// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use divan::counter::{BytesCount, ItemsCount};
use layercast::broadcast::causal::{CausalMessage, Stamped, VectorClock, WaitingCausal};
use layercast::broadcast::{Data, Layer, Stack, eager};
use layercast::membership::Membership;
use layercast::network::{decode, encode};

fn main() {
    // run registered benchmarks.
    divan::main();
}

fn causal_message(history: usize) -> Data<CausalMessage<Vec<u8>>> {
    let past = (0..history)
        .map(|i| ((i % 16) as u64, vec![i as u8; 64]))
        .collect();
    Data::new(0, CausalMessage {
        origin: 0,
        payload: vec![0; 64],
        past,
    })
}

#[divan::bench(args = [0, 16, 256])]
fn encode_causal_message(bencher: divan::Bencher, history: usize) {
    let msg = causal_message(history);
    let len = encode(&msg).unwrap().len();
    bencher
        .counter(BytesCount::new(len))
        .bench(|| encode(&msg).unwrap());
}

#[divan::bench(args = [0, 16, 256])]
fn decode_causal_message(bencher: divan::Bencher, history: usize) {
    let bytes = encode(&causal_message(history)).unwrap();
    bencher
        .counter(BytesCount::new(bytes.len()))
        .bench(|| decode::<Data<CausalMessage<Vec<u8>>>>(&bytes).unwrap());
}

#[divan::bench(args = [4, 16, 64])]
fn eager_receive(bencher: divan::Bencher, members: u64) {
    let membership = Arc::new(Membership::new(0, 0..members).unwrap());
    bencher
        .counter(ItemsCount::new(members))
        .with_inputs(|| eager::stack::<u64>(membership.clone()))
        .bench_values(|mut stack| stack.receive(1, Data::new(1, 42)));
}

/// Delivers `count` messages from one origin in reverse order.
/// All but the last one are buffered, then the whole buffer drains.
#[divan::bench(args = [16, 128, 1024])]
fn waiting_causal_drain(bencher: divan::Bencher, count: u64) {
    let membership = Arc::new(Membership::new(0, 0..4).unwrap());
    let messages: Vec<_> = (0..count)
        .rev()
        .map(|seq| Stamped {
            origin: 1,
            clock: VectorClock::from(vec![0, seq, 0, 0]),
            payload: seq,
        })
        .collect();
    bencher
        .counter(ItemsCount::new(count))
        .with_inputs(|| (WaitingCausal::new(membership.clone()), messages.clone()))
        .bench_values(|(mut crb, messages)| {
            for msg in messages {
                crb.deliver(1, msg);
            }
            crb
        });
}
