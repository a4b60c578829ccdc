use tchat_client::Config;
use tchat_session::ReplayMode;

#[test]
fn defaults_match_the_protocol() {
    let config = Config::default();
    assert_eq!(config.port, tchat_proto::DEFAULT_PORT);
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.user_id, None);
    assert_eq!(config.replay_mode, ReplayMode::Strict);
    assert!(config.keystore_dir.ends_with(".tchatsapp/keys") || cfg!(windows));
}
