use tchat_crypto::generate_keypair;
use tchat_session::derive_hop_session;

#[test]
fn both_ends_derive_the_same_hop_session() {
    let (server_secret, server_pub) = generate_keypair();
    let (client_secret, client_pub) = generate_keypair();
    let server_pub = *server_pub.as_bytes();
    let client_pub = *client_pub.as_bytes();

    let (conv_s, key_s) =
        derive_hop_session(&server_secret, &client_pub, &server_pub, &client_pub).unwrap();
    let (conv_c, key_c) =
        derive_hop_session(&client_secret, &server_pub, &server_pub, &client_pub).unwrap();

    assert_eq!(conv_s, conv_c);
    assert_eq!(key_s, key_c);
    assert!(conv_s.as_str().starts_with("server_session_"));
    // 8 digest bytes → 16 hex characters.
    assert_eq!(conv_s.as_str().len(), "server_session_".len() + 16);
}

#[test]
fn different_connections_get_different_hop_sessions() {
    let (server_secret, server_pub) = generate_keypair();
    let server_pub = *server_pub.as_bytes();
    let (_, client_a) = generate_keypair();
    let (_, client_b) = generate_keypair();

    let (conv_a, _) =
        derive_hop_session(&server_secret, client_a.as_bytes(), &server_pub, client_a.as_bytes())
            .unwrap();
    let (conv_b, _) =
        derive_hop_session(&server_secret, client_b.as_bytes(), &server_pub, client_b.as_bytes())
            .unwrap();
    assert_ne!(conv_a, conv_b);
}

#[test]
fn degenerate_peer_key_is_refused() {
    let (secret, public) = generate_keypair();
    let server_pub = *public.as_bytes();
    assert!(derive_hop_session(&secret, &[0u8; 32], &server_pub, &[0u8; 32]).is_none());
}
