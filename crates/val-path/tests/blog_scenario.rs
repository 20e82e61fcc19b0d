use val_path::{
    append_segment, from_patch_path, join_combined, split_combined, to_patch_path,
    ModuleFilePath, ModulePath, PathError, Segment, SourcePath,
};

#[test]
fn blog_title_addresses() {
    let module = ModuleFilePath::new("/content/blog.val.ts").unwrap();
    let path = ModulePath::root().child("posts").child(0usize).child("title");
    let combined = join_combined(&module, &path);
    assert_eq!(combined.as_str(), r#"/content/blog.val.ts?p="posts".0."title""#);
    assert_eq!(to_patch_path(path.as_str()).unwrap(), vec!["posts", "0", "title"]);
    assert_eq!(
        from_patch_path(&["posts".to_string(), "0".to_string(), "title".to_string()]),
        path
    );
}

#[test]
fn appending_record_key_that_looks_numeric_keeps_quotes() {
    let base = ModulePath::new(r#""translations""#).unwrap();
    let child = append_segment(&base, &Segment::Key("404".to_string()));
    assert_eq!(child.as_str(), r#""translations"."404""#);
}

#[test]
fn empty_module_portion_fails() {
    assert_eq!(split_combined(r#"?p="a""#), Err(PathError::EmptyModulePath));
    assert!(SourcePath::new("").is_err());
}

#[test]
fn source_path_accessors() {
    let sp = SourcePath::new(r#"/content/blog.val.ts?p="posts".1"#).unwrap();
    assert_eq!(sp.module_file_path().as_str(), "/content/blog.val.ts");
    assert_eq!(sp.module_path().as_str(), r#""posts".1"#);
}
