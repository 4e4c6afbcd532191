use labctl::credential::CredentialFile;

#[test]
fn credential_file_holds_contents_until_dropped() {
    let file = CredentialFile::create(b"-----BEGIN KEY-----\n").unwrap();
    let path = file.path().to_path_buf();

    assert_eq!(std::fs::read(&path).unwrap(), b"-----BEGIN KEY-----\n");
    drop(file);

    assert!(!path.exists());
}

#[cfg(unix)]
#[test]
fn credential_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let file = CredentialFile::create(b"key").unwrap();

    let mode = std::fs::metadata(file.path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn close_removes_the_file() {
    let file = CredentialFile::create(b"key").unwrap();
    let path = file.path().to_path_buf();

    file.close().unwrap();

    assert!(!path.exists());
}
