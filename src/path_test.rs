use super::*;
use std::path::Path;

#[test]
fn strips_drive_letter_and_normalizes_separators() {
    let root = Path::new("/tmp/dosroot");
    let got = dos_to_host(r"C:\DIR\FILE.EXT", root, CaseFold::None);
    assert_eq!(got, Path::new("/tmp/dosroot/DIR/FILE.EXT"));
}

#[test]
fn accepts_forward_slashes() {
    let root = Path::new("/tmp/dosroot");
    let got = dos_to_host("/DIR/FILE.EXT", root, CaseFold::None);
    assert_eq!(got, Path::new("/tmp/dosroot/DIR/FILE.EXT"));
}

#[test]
fn case_fold_lower() {
    let root = Path::new("/tmp/dosroot");
    let got = dos_to_host(r"C:\DIR\FILE.EXT", root, CaseFold::Lower);
    assert_eq!(got, Path::new("/tmp/dosroot/dir/file.ext"));
}

#[test]
fn bare_filename_joins_directly_under_root() {
    let root = Path::new("/tmp/dosroot");
    let got = dos_to_host("TEST.TXT", root, CaseFold::None);
    assert_eq!(got, Path::new("/tmp/dosroot/TEST.TXT"));
}
