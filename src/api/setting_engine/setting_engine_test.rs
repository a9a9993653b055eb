use super::*;

#[test]
fn test_set_connection_timeout() -> Result<()> {
    let mut s = SettingEngine::default();

    assert_eq!(s.timeout.ice_disconnected_timeout, None);
    assert_eq!(s.timeout.ice_failed_timeout, None);
    assert_eq!(s.timeout.ice_keepalive_interval, None);
    assert_eq!(s.ice_disconnected_timeout(), Duration::from_secs(5));
    assert_eq!(s.ice_failed_timeout(), Duration::from_secs(25));
    assert_eq!(s.ice_keepalive_interval(), Duration::from_secs(2));

    s.set_ice_timeouts(
        Some(Duration::from_secs(1)),
        Some(Duration::from_secs(2)),
        Some(Duration::from_secs(3)),
    );
    assert_eq!(s.ice_disconnected_timeout(), Duration::from_secs(1));
    assert_eq!(s.ice_failed_timeout(), Duration::from_secs(2));
    assert_eq!(s.ice_keepalive_interval(), Duration::from_secs(3));

    Ok(())
}

#[test]
fn test_set_answering_dtls_role() -> Result<()> {
    let mut s = SettingEngine::default();
    assert_eq!(
        s.set_answering_dtls_role(DTLSRole::Auto),
        Err(Error::ErrSettingEngineSetAnsweringDTLSRole),
        "SetAnsweringDTLSRole can only be called with DTLSRoleClient or DTLSRoleServer"
    );
    assert_eq!(
        s.set_answering_dtls_role(DTLSRole::Unspecified),
        Err(Error::ErrSettingEngineSetAnsweringDTLSRole),
        "SetAnsweringDTLSRole can only be called with DTLSRoleClient or DTLSRoleServer"
    );

    s.set_answering_dtls_role(DTLSRole::Server)?;
    assert_eq!(s.answering_dtls_role, DTLSRole::Server);

    Ok(())
}

#[test]
fn test_set_ice_credentials() {
    let mut s = SettingEngine::default();
    assert!(s.candidates.username_fragment.is_empty());

    s.set_ice_credentials("ufrag".to_owned(), "pwd".to_owned());
    assert_eq!(s.candidates.username_fragment, "ufrag");
    assert_eq!(s.candidates.password, "pwd");
}

#[test]
fn test_set_mid_generator() {
    let mut s = SettingEngine::default();
    assert!(s.mid_generator.is_none());

    s.set_mid_generator(|max| format!("m{}", max + 1));
    let f = s.mid_generator.as_ref().expect("generator");
    assert_eq!(f(2), "m3");
}
