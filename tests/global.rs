//! The allocator registered as the process-wide heap.

use std::{collections::HashMap, sync::Arc, thread};

use blockalloc::MemAlloc;

#[global_allocator]
static GLOBAL: MemAlloc = MemAlloc::new();

#[test]
fn test_box() {
    let b = Box::new(22u64);
    assert_eq!(22, *b);
}

#[test]
fn test_vec_growth() {
    let mut v = Vec::new();
    for i in 0..1000 {
        v.push(i * 10);
    }

    assert_eq!(1000, v.len());
    assert_eq!(5000, v[500]);
}

#[test]
fn test_string() {
    let mut s = String::from("Heap Testing");
    for _ in 0..100 {
        s.push_str(" again");
    }

    assert!(s.starts_with("Heap Testing again"));
    assert_eq!(12 + 600, s.len());
}

#[test]
fn test_hashmap() {
    let mut map = HashMap::new();
    for i in 0..500 {
        map.insert(i, format!("value_{i}"));
    }

    assert_eq!(500, map.len());
    assert_eq!("value_42", map[&42]);
}

#[test]
fn test_large_allocation() {
    let v = vec![0xABu8; 512 * 1024];

    assert_eq!(512 * 1024, v.len());
    assert!(v.iter().all(|&byte| byte == 0xAB));
}

#[test]
fn test_over_aligned_types() {
    #[repr(align(64))]
    struct CacheLine([u8; 64]);

    #[repr(align(4096))]
    struct Page([u8; 4096]);

    let line = Box::new(CacheLine([7; 64]));
    let page = Box::new(Page([9; 4096]));
    let wide = Box::new(u128::MAX);

    assert_eq!(0, &*line as *const CacheLine as usize % 64);
    assert_eq!(0, &*page as *const Page as usize % 4096);
    assert_eq!(0, &*wide as *const u128 as usize % std::mem::align_of::<u128>());

    assert!(line.0.iter().all(|&byte| byte == 7));
    assert!(page.0.iter().all(|&byte| byte == 9));
    assert_eq!(u128::MAX, *wide);
}

#[test]
fn test_alloc_free_cycle() {
    for round in 0..100u64 {
        let v: Vec<u64> = (0..100).map(|x| x + round).collect();
        assert_eq!(round + 99, v[99]);
    }
}

#[test]
fn test_threads_share_heap() {
    let data = Arc::new(vec![1u64, 2, 3, 4, 5]);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let data = Arc::clone(&data);
            thread::spawn(move || {
                let local: Vec<Box<[u64; 8]>> = (0..200).map(|i| Box::new([i + t; 8])).collect();
                assert!(local.iter().enumerate().all(|(i, b)| b[7] == i as u64 + t));
                data.iter().sum::<u64>()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(15, handle.join().unwrap());
    }
}
