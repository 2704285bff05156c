//! Vulkan backend tests. Each test returns early on machines without a
//! Vulkan adapter.
#![cfg(feature = "vulkan")]

use zivc_rs::prelude::*;

fn vulkan_device(context: &Context) -> Option<Device> {
    let index = context
        .device_info_list()
        .iter()
        .position(|info| info.kind() == BackendKind::Vulkan)?;
    context.query_device(index).ok()
}

fn context() -> Context {
    let options = ContextOptions::builder()
        .num_threads(2)
        .enable_vulkan(true)
        .build()
        .unwrap();
    create_context(options).unwrap()
}

const ADD_SOURCE: &str = r#"
struct Pods {
    bias: u32,
}

struct LaunchInfo {
    global_offset: vec4<u32>,
    work_size: vec4<u32>,
}

@group(0) @binding(0) var<storage, read> input: array<u32>;
@group(0) @binding(1) var<storage, read_write> output: array<u32>;
@group(0) @binding(2) var<storage, read> pods: Pods;
@group(0) @binding(3) var<uniform> info: LaunchInfo;

@compute @workgroup_size(64, 1, 1)
fn add_bias(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= info.work_size.x) {
        return;
    }
    let i = id.x + info.global_offset.x;
    output[i] = input[i] + pods.bias;
}
"#;

#[test]
fn test_vulkan_round_trip() {
    let context = context();
    let Some(device) = vulkan_device(&context) else {
        eprintln!("no vulkan adapter, skipping");
        return;
    };

    let n = 1000;
    let host = device.make_buffer::<u32>(BufferUsage::PreferHost).unwrap();
    let middle = device.make_buffer::<u32>(BufferUsage::DeviceOnly).unwrap();
    let back = device.make_buffer::<u32>(BufferUsage::DeviceToHost).unwrap();
    for buffer in [&host, &middle, &back] {
        buffer.set_size(n).unwrap();
    }
    assert!(!middle.is_host_visible() || middle.is_device_local());

    {
        let mut mapped = host.map_memory().unwrap();
        for (i, v) in mapped.iter_mut().enumerate() {
            *v = i as u32 * 3;
        }
    }
    copy(&host, &middle, &BufferLaunchOptions::new()).unwrap();
    copy(&middle, &back, &BufferLaunchOptions::new()).unwrap();

    let data = back.map_memory().unwrap();
    for (i, &v) in data.iter().enumerate() {
        assert_eq!(v, i as u32 * 3);
    }
}

#[test]
fn test_vulkan_unaligned_fill() {
    let context = context();
    let Some(device) = vulkan_device(&context) else {
        return;
    };

    let buffer = device.make_buffer::<u8>(BufferUsage::PreferHost).unwrap();
    buffer.set_size(37).unwrap();
    buffer.fill(1, &BufferLaunchOptions::new()).unwrap();
    buffer
        .fill(9, &BufferLaunchOptions::new().dest_offset(3).size(29))
        .unwrap();

    let data = buffer.map_memory().unwrap();
    assert!(data[..3].iter().all(|&v| v == 1));
    assert!(data[3..32].iter().all(|&v| v == 9));
    assert!(data[32..].iter().all(|&v| v == 1));
}

#[test]
fn test_vulkan_kernel() {
    let context = context();
    let Some(device) = vulkan_device(&context) else {
        return;
    };

    let n = 500;
    let input = device.make_buffer::<u32>(BufferUsage::PreferHost).unwrap();
    let output = device.make_buffer::<u32>(BufferUsage::PreferHost).unwrap();
    input.set_size(n).unwrap();
    output.set_size(n).unwrap();
    {
        let mut mapped = input.map_memory().unwrap();
        for (i, v) in mapped.iter_mut().enumerate() {
            *v = i as u32;
        }
    }

    let mut kernel = device
        .create_kernel(
            KernelInit::<(Constant<u32>, Global<u32>, u32)>::new("add_bias", 1)
                .work_group_size([64, 1, 1])
                .wgsl(ADD_SOURCE, "add_bias"),
        )
        .unwrap();

    let options = LaunchOptions::new().work_size([n as u32, 1, 1]);
    kernel.run((&input, &output, 10), &options).unwrap();
    {
        let data = output.map_memory().unwrap();
        for (i, &v) in data.iter().enumerate() {
            assert_eq!(v, i as u32 + 10);
        }
    }

    let mut result = kernel
        .run((&input, &output, 20), &options.clone().external_sync_mode(true))
        .unwrap();
    result.wait().unwrap();
    assert_eq!(output.map_memory().unwrap()[5], 25);
}

#[test]
fn test_vulkan_memory_heaps() {
    let context = context();
    let Some(device) = vulkan_device(&context) else {
        return;
    };

    let info = device.device_info();
    assert!(!info.heap_info_list().is_empty());
    assert_eq!(device.heap_usage_list().len(), info.heap_info_list().len());
    assert!(info.max_num_of_buffers_per_kernel() >= 4);

    let buffer = device.make_buffer::<f32>(BufferUsage::DeviceOnly).unwrap();
    buffer.set_size(256).unwrap();
    let counter = &device.heap_usage_list()[buffer.heap_index()];
    assert!(counter.current() >= 1024);
    drop(buffer);
    assert_eq!(counter.current(), 0);
}
