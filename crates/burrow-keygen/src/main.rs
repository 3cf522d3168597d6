//! burrow-keygen - prints a fresh WireGuard keypair in base64, ready to
//! paste into `server.toml` or `client.toml`.

use clap::Parser;

use burrow_wireguard::KeyPair;

#[derive(Parser)]
#[command(name = "burrow-keygen")]
#[command(about = "Generate a WireGuard keypair for Burrow configs")]
#[command(version)]
struct Cli {}

fn main() {
    let _cli = Cli::parse();

    let pair = KeyPair::generate();
    println!("Private Key: {}", pair.private_key().to_base64());
    println!("Public Key:  {}", pair.public_key().to_base64());
}
