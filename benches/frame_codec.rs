use criterion::{black_box, criterion_group, criterion_main, Criterion};

use miio::crypto::cipher;
use miio::frame;
use miio::{DeviceKeys, Handshake};

fn bench_request_build(c: &mut Criterion) {
    let token = [0x24u8; 16];
    let handshake = Handshake {
        device_id: 0x0102_0304,
        server_stamp: 77,
    };
    let payload = br#"{"id":1,"method":"get_prop","params":["power","temperature","humidity"]}"#;

    c.bench_function("derive_keys", |b| {
        b.iter(|| DeviceKeys::from_token(black_box(&token)))
    });

    c.bench_function("encrypt_and_frame", |b| {
        b.iter(|| {
            let keys = DeviceKeys::from_token(&token);
            let body = cipher::encrypt(&keys, black_box(payload));
            frame::build_request_header(&token, &handshake, &body).map(|header| (header, body))
        })
    });

    let keys = DeviceKeys::from_token(&token);
    let ciphertext = cipher::encrypt(&keys, payload);
    c.bench_function("decrypt_response", |b| {
        b.iter(|| cipher::decrypt(&keys, black_box(&ciphertext)))
    });
}

criterion_group!(benches, bench_request_build);
criterion_main!(benches);
