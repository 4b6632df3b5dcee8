//! Compresses a simulated database column of user ids with both codec
//! variants and prints the round-tripped values.

use pairzip::{PairZip, PairZip16};

fn main() {
    let strings = vec![
        "user_000001",
        "user_000002",
        "user_000003",
        "admin_001",
        "user_000004",
        "user_000005",
        "guest_001",
        "user_000006",
        "admin_002",
        "user_000007",
    ];

    let num_strings = strings.len();
    let num_bytes = strings.iter().map(|s| s.len()).sum::<usize>();

    let mut unbounded = PairZip::with_capacity(num_strings, num_bytes);
    unbounded
        .compress_strings(&strings)
        .expect("flattened layout is valid");

    let mut bounded = PairZip16::with_capacity(num_strings, num_bytes);
    bounded
        .compress_strings(&strings)
        .expect("flattened layout is valid");

    println!(
        "input: {} bytes, PairZip: {} bytes, PairZip16: {} bytes",
        num_bytes,
        unbounded.space_used(),
        bounded.space_used()
    );

    let longest = strings.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut buffer = vec![0u8; longest + 16];

    for (index, expected) in strings.iter().enumerate() {
        println!("\nstring {index}: {expected:?}");

        let written = unbounded.decompress_string(index, &mut buffer);
        println!("- PairZip:   {:?}", String::from_utf8_lossy(&buffer[..written]));

        let written = bounded.decompress_string(index, &mut buffer);
        println!("- PairZip16: {:?}", String::from_utf8_lossy(&buffer[..written]));
    }
}
