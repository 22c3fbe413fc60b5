use phrasekey_crypto::{derive_from_mnemonic, derive_keypair, unwrap, wrap};
use secrecy::SecretString;

const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon \
     abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon \
     abandon abandon abandon abandon abandon art";

#[divan::bench]
fn bench_derive_keypair() {
    derive_keypair(divan::black_box(&[0x42u8; 32])).unwrap();
}

#[divan::bench]
fn bench_derive_from_mnemonic(bencher: divan::Bencher) {
    let phrase = SecretString::from(PHRASE);
    bencher.bench(|| derive_from_mnemonic(divan::black_box(&phrase)).unwrap());
}

#[divan::bench]
fn bench_wrap(bencher: divan::Bencher) {
    let pair = derive_keypair(&[0x42u8; 32]).unwrap();
    let file_key = [0xABu8; 16];
    bencher.bench(|| wrap(divan::black_box(&pair.public), divan::black_box(&file_key)).unwrap());
}

#[divan::bench(args = [1, 4, 16])]
fn bench_unwrap_last_of(bencher: divan::Bencher, stanza_count: usize) {
    let pair = derive_keypair(&[0x42u8; 32]).unwrap();
    let other = derive_keypair(&[0x24u8; 32]).unwrap();
    let file_key = [0xABu8; 16];

    let mut stanzas: Vec<_> = (1..stanza_count)
        .map(|_| wrap(&other.public, &file_key).unwrap())
        .collect();
    stanzas.push(wrap(&pair.public, &file_key).unwrap());

    bencher.bench(|| {
        unwrap(
            divan::black_box(&pair.private),
            divan::black_box(&pair.public),
            divan::black_box(&stanzas),
        )
        .unwrap()
    });
}

fn main() {
    divan::main();
}
