//! Stress tests for the CPU backend

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use zivc_rs::prelude::*;

fn context(threads: usize) -> Context {
    let options = ContextOptions::builder()
        .num_threads(threads)
        .build()
        .unwrap();
    create_context(options).unwrap()
}

fn increment(item: &WorkItem, (data,): (GlobalPtr<u32>,)) {
    let i = item.global_id(0) as usize;
    unsafe {
        *data.unsafe_index_mut(i) += 1;
    }
}

#[test]
#[ignore] // Run with --ignored flag
fn stress_test_many_launches() {
    let context = context(num_cpus::get().max(2));
    let device = context.query_device(0).unwrap();
    let data = device.make_buffer::<u32>(BufferUsage::PreferHost).unwrap();
    data.set_size(10_000).unwrap();

    let mut kernel = device
        .create_kernel(KernelInit::<(Global<u32>,)>::new("increment", 1).cpu(increment))
        .unwrap();
    let options = LaunchOptions::new().work_size([10_000, 1, 1]);
    for _ in 0..500 {
        kernel.run((&data,), &options).unwrap();
    }

    assert!(data.map_memory().unwrap().iter().all(|&v| v == 500));
    assert_eq!(device.metrics().snapshot().kernel_launches, 500);
}

#[test]
#[ignore]
fn stress_test_async_launches_within_fence_capacity() {
    let options = ContextOptions::builder()
        .num_threads(4)
        .fence_capacity(8)
        .build()
        .unwrap();
    let context = create_context(options).unwrap();
    let device = context.query_device(0).unwrap();

    let buffers: Vec<_> = (0..8)
        .map(|_| {
            let buffer = device.make_buffer::<u32>(BufferUsage::PreferHost).unwrap();
            buffer.set_size(4096).unwrap();
            buffer
        })
        .collect();
    let mut kernel = device
        .create_kernel(KernelInit::<(Global<u32>,)>::new("increment", 1).cpu(increment))
        .unwrap();
    let options = LaunchOptions::new()
        .work_size([4096, 1, 1])
        .external_sync_mode(true);

    for _ in 0..50 {
        let mut pending: Vec<_> = buffers
            .iter()
            .map(|buffer| kernel.run((buffer,), &options).unwrap())
            .collect();
        for result in &mut pending {
            result.wait().unwrap();
        }
        assert_eq!(device.num_of_fences(), 8);
    }

    for buffer in &buffers {
        assert!(buffer.map_memory().unwrap().iter().all(|&v| v == 50));
    }
}

#[test]
#[ignore]
fn stress_test_concurrent_allocation() {
    let context = Arc::new(context(4));
    let device = context.query_device(0).unwrap();
    let counter = device.heap_usage_list()[0].clone();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let device = device.clone();
            thread::spawn(move || {
                for round in 0..200usize {
                    let buffer = device.make_buffer::<u8>(BufferUsage::PreferHost).unwrap();
                    buffer.set_size(64 + (t * 31 + round) % 4096).unwrap();
                    buffer.fill(t as u8, &BufferLaunchOptions::new()).unwrap();
                    assert!(buffer.map_memory().unwrap().iter().all(|&v| v == t as u8));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(counter.current(), 0);
    assert!(counter.peak() >= 64);
}

#[test]
#[ignore]
fn stress_test_concurrent_query_device() {
    let context = Arc::new(context(2));
    let devices = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let context = Arc::clone(&context);
            let devices = Arc::clone(&devices);
            thread::spawn(move || {
                let device = context.query_device(0).unwrap();
                devices.lock().push(device);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let devices = devices.lock();
    assert_eq!(devices.len(), 16);
    assert!(devices.iter().all(|d| d.ptr_eq(&devices[0])));
}
