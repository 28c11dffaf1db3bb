// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    cell::RefCell,
    fs,
    io::{Cursor, Read, Write},
    path::{Path, PathBuf},
    rc::Rc,
};

use assert_matches::assert_matches;
use bootedit::{
    format::{
        compression::{CompressedFormat, CompressedReader, CompressedWriter},
        slice::{self, ComponentSlice},
    },
    pipeline::{self, ComponentKind, Error},
    tool::{self, ExternalTool, ToolSet, ToolStatus},
};
use tempfile::TempDir;

type Calls = Rc<RefCell<Vec<(PathBuf, PathBuf)>>>;

struct FakeTool {
    name: &'static str,
    available: bool,
    code: i32,
    calls: Calls,
    action: fn(&Path, &Path),
}

impl ExternalTool for FakeTool {
    fn name(&self) -> &str {
        self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn run(&self, input: &Path, output: &Path) -> Result<ToolStatus, tool::Error> {
        self.calls
            .borrow_mut()
            .push((input.to_owned(), output.to_owned()));

        if self.code == 0 {
            (self.action)(input, output);
        }

        Ok(ToolStatus {
            code: Some(self.code),
            stderr: if self.code == 0 {
                String::new()
            } else {
                format!("{} failed\n", self.name)
            },
        })
    }
}

/// Copies the archive into the output directory so tests can see what was
/// passed in.
fn fake_cpio(input: &Path, output: &Path) {
    fs::copy(input, output.join("archive")).unwrap();
}

fn fake_builder(_input: &Path, output: &Path) {
    fs::write(output, b"070701 fake archive").unwrap();
}

fn fake_dtc(_input: &Path, output: &Path) {
    fs::write(output, b"/dts-v1/;\n").unwrap();
}

fn fake_kernel_info(_input: &Path, output: &Path) {
    fs::write(output.join("kernel_version.txt"), b"6.1.0\n").unwrap();
}

#[derive(Default)]
struct Fakes {
    cpio: Calls,
    builder: Calls,
    dtc: Calls,
    kernel_info: Calls,
}

impl Fakes {
    /// Create a tool set where every tool is available and succeeds, except
    /// for the overrides.
    fn tools(&self, unavailable: &[&str], failing: &[&str]) -> ToolSet {
        let fake = |name: &'static str, calls: &Calls, action: fn(&Path, &Path)| {
            Box::new(FakeTool {
                name,
                available: !unavailable.contains(&name),
                code: if failing.contains(&name) { 1 } else { 0 },
                calls: calls.clone(),
                action,
            }) as Box<dyn ExternalTool>
        };

        ToolSet {
            cpio: fake("cpio", &self.cpio, fake_cpio),
            ramdisk_builder: fake("mkbootfs", &self.builder, fake_builder),
            dtc: fake("dtc", &self.dtc, fake_dtc),
            kernel_info: fake("kernel_info", &self.kernel_info, fake_kernel_info),
        }
    }
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut writer = CompressedWriter::new(Cursor::new(Vec::new()), CompressedFormat::Gzip);
    writer.write_all(data).unwrap();
    writer.finish().unwrap().into_inner()
}

/// Write an image with `component` at offset 512 and return a slice for it.
fn image_with(dir: &Path, component: &[u8], dest: &str) -> ComponentSlice {
    let mut data = vec![0xaau8; 512];
    data.extend_from_slice(component);
    data.resize(data.len() + 300, 0xbb);

    let source = dir.join("boot.img");
    fs::write(&source, &data).unwrap();

    ComponentSlice::new(source, 512, component.len() as u64, dir.join(dest))
}

#[test]
fn ramdisk_gzip() {
    let temp_dir = TempDir::new().unwrap();
    let compressed = gzip(b"070701 cpio archive");
    let slice = image_with(temp_dir.path(), &compressed, "ramdisk.gz");

    let root = temp_dir.path().join("root");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("stale"), b"").unwrap();

    let fakes = Fakes::default();
    let unpacked = pipeline::unpack_ramdisk(&slice, &fakes.tools(&[], &[]), &root).unwrap();

    assert_eq!(unpacked.size, compressed.len() as u64);
    assert_eq!(unpacked.format, Some(CompressedFormat::Gzip));
    assert_eq!(unpacked.decoded.as_deref(), Some(root.as_path()));
    assert_eq!(fs::read(slice.destination()).unwrap(), compressed);

    let raw = temp_dir.path().join("ramdisk");
    assert_eq!(fs::read(&raw).unwrap(), b"070701 cpio archive");
    assert_eq!(*fakes.cpio.borrow(), [(raw, root.clone())]);

    assert!(!root.join("stale").exists());
    assert_eq!(fs::read(root.join("archive")).unwrap(), b"070701 cpio archive");
}

#[test]
fn ramdisk_gzip_without_suffix() {
    let temp_dir = TempDir::new().unwrap();
    let slice = image_with(temp_dir.path(), &gzip(b"archive"), "ramdisk");
    let root = temp_dir.path().join("out").join("root");

    let fakes = Fakes::default();
    pipeline::unpack_ramdisk(&slice, &fakes.tools(&[], &[]), &root).unwrap();

    let raw = temp_dir.path().join("ramdisk.cpio");
    assert_eq!(fs::read(&raw).unwrap(), b"archive");
    assert_eq!(fakes.cpio.borrow()[0].0, raw);
    assert!(root.is_dir());
}

#[test]
fn ramdisk_uncompressed() {
    let temp_dir = TempDir::new().unwrap();
    let slice = image_with(temp_dir.path(), b"070701 raw", "ramdisk.cpio");
    let root = temp_dir.path().join("root");

    let fakes = Fakes::default();
    let unpacked = pipeline::unpack_ramdisk(&slice, &fakes.tools(&[], &[]), &root).unwrap();

    assert_eq!(unpacked.format, Some(CompressedFormat::None));
    assert_eq!(fakes.cpio.borrow()[0].0, slice.destination());
}

#[test]
fn ramdisk_requires_cpio() {
    let temp_dir = TempDir::new().unwrap();
    let slice = image_with(temp_dir.path(), &gzip(b"archive"), "ramdisk.gz");

    let root = temp_dir.path().join("root");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("init"), b"previous unpack").unwrap();

    let fakes = Fakes::default();
    assert_matches!(
        pipeline::unpack_ramdisk(&slice, &fakes.tools(&["cpio"], &[]), &root),
        Err(Error::Tool(tool::Error::Unavailable(name))) if name == "cpio"
    );
    assert!(fakes.cpio.borrow().is_empty());

    // The existing tree is kept.
    assert_eq!(fs::read(root.join("init")).unwrap(), b"previous unpack");
}

#[test]
fn ramdisk_root_must_not_contain_inputs() {
    let temp_dir = TempDir::new().unwrap();
    let out_dir = temp_dir.path().join("out");
    fs::create_dir(&out_dir).unwrap();
    fs::write(out_dir.join("keep"), b"").unwrap();

    let compressed = gzip(b"archive");
    let slice = image_with(temp_dir.path(), &compressed, "out/ramdisk.gz");

    let fakes = Fakes::default();
    let tools = fakes.tools(&[], &[]);

    assert_matches!(
        pipeline::unpack_ramdisk(&slice, &tools, &out_dir),
        Err(Error::RootContainsInput { input, .. }) if input == slice.destination()
    );
    assert_matches!(
        pipeline::unpack_ramdisk(&slice, &tools, temp_dir.path()),
        Err(Error::RootContainsInput { .. })
    );
    assert!(fakes.cpio.borrow().is_empty());

    assert_eq!(fs::read(slice.destination()).unwrap(), compressed);
    assert!(out_dir.join("ramdisk").exists());
    assert!(out_dir.join("keep").exists());
}

#[test]
fn dtb_decompiled() {
    let temp_dir = TempDir::new().unwrap();
    let slice = image_with(temp_dir.path(), b"\xd0\x0d\xfe\xed dtb", "dtb");

    let fakes = Fakes::default();
    let unpacked = pipeline::unpack_dtb(&slice, &fakes.tools(&[], &[])).unwrap();

    let dts = temp_dir.path().join("dtb.dts");
    assert_eq!(unpacked.decoded.as_deref(), Some(dts.as_path()));
    assert_eq!(fs::read(&dts).unwrap(), b"/dts-v1/;\n");
    assert_eq!(
        *fakes.dtc.borrow(),
        [(slice.destination().to_owned(), dts)]
    );
}

#[test]
fn optional_tools_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let fakes = Fakes::default();
    let tools = fakes.tools(&["dtc", "kernel_info"], &[]);

    let slice = image_with(temp_dir.path(), b"dtb data", "dtb");
    let unpacked = pipeline::unpack_dtb(&slice, &tools).unwrap();
    assert_eq!(unpacked.decoded, None);
    assert_eq!(fs::read(slice.destination()).unwrap(), b"dtb data");

    let slice = image_with(temp_dir.path(), b"kernel data", "kernel");
    let unpacked = pipeline::unpack_kernel(&slice, &tools).unwrap();
    assert_eq!(unpacked.decoded, None);
    assert_eq!(unpacked.size, 11);

    assert!(fakes.dtc.borrow().is_empty());
    assert!(fakes.kernel_info.borrow().is_empty());
}

#[test]
fn kernel_info_written() {
    let temp_dir = TempDir::new().unwrap();
    let slice = image_with(temp_dir.path(), b"kernel data", "kernel");

    let fakes = Fakes::default();
    let unpacked = pipeline::unpack(
        ComponentKind::Kernel,
        &slice,
        &fakes.tools(&[], &[]),
        &temp_dir.path().join("root"),
    )
    .unwrap();

    assert_eq!(unpacked.decoded.as_deref(), Some(temp_dir.path()));
    assert_eq!(
        fs::read(temp_dir.path().join("kernel_version.txt")).unwrap(),
        b"6.1.0\n"
    );
    assert!(!temp_dir.path().join("root").exists());
}

#[test]
fn tool_failure_propagates() {
    let temp_dir = TempDir::new().unwrap();
    let slice = image_with(temp_dir.path(), b"kernel data", "kernel");

    let fakes = Fakes::default();
    assert_matches!(
        pipeline::unpack_kernel(&slice, &fakes.tools(&[], &["kernel_info"])),
        Err(Error::Tool(tool::Error::Failed { name, status }))
            if name == "kernel_info" && status.code == Some(1)
    );

    // The component itself was still extracted.
    assert_eq!(fs::read(slice.destination()).unwrap(), b"kernel data");
}

#[test]
fn raw_extract_only() {
    let temp_dir = TempDir::new().unwrap();
    let slice = image_with(temp_dir.path(), b"second stage", "second");

    let fakes = Fakes::default();
    let unpacked = pipeline::unpack(
        ComponentKind::Raw,
        &slice,
        &fakes.tools(&[], &[]),
        &temp_dir.path().join("root"),
    )
    .unwrap();

    assert_eq!(unpacked.size, 12);
    assert_eq!(unpacked.format, None);
    assert_eq!(unpacked.decoded, None);
}

#[test]
fn extract_failure_propagates() {
    let temp_dir = TempDir::new().unwrap();
    let slice = image_with(temp_dir.path(), b"dtb", "dtb");
    let bad = ComponentSlice::new(slice.source(), 512, 1 << 20, slice.destination());

    let fakes = Fakes::default();
    assert_matches!(
        pipeline::unpack_dtb(&bad, &fakes.tools(&[], &[])),
        Err(Error::Slice(slice::Error::SliceOutOfBounds { .. }))
    );
    assert!(fakes.dtc.borrow().is_empty());
}

#[test]
fn repack_gzip() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("root");
    fs::create_dir(&root).unwrap();
    let output = temp_dir.path().join("ramdisk.gz");

    let fakes = Fakes::default();
    let size =
        pipeline::repack_ramdisk(&root, &fakes.tools(&[], &[]), &output, CompressedFormat::Gzip)
            .unwrap();

    let data = fs::read(&output).unwrap();
    assert_eq!(size, data.len() as u64);

    let mut reader = CompressedReader::new(Cursor::new(data), false).unwrap();
    assert_eq!(reader.format(), CompressedFormat::Gzip);

    let mut archive = vec![];
    reader.read_to_end(&mut archive).unwrap();
    assert_eq!(archive, b"070701 fake archive");

    let calls = fakes.builder.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, root);
    assert!(!calls[0].1.exists());
}

#[test]
fn repack_uncompressed() {
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("ramdisk.cpio");

    let fakes = Fakes::default();
    let size = pipeline::repack_ramdisk(
        temp_dir.path(),
        &fakes.tools(&[], &[]),
        &output,
        CompressedFormat::None,
    )
    .unwrap();

    assert_eq!(size, 19);
    assert_eq!(fs::read(&output).unwrap(), b"070701 fake archive");
}

#[test]
fn repack_requires_builder() {
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("ramdisk.gz");

    let fakes = Fakes::default();
    assert_matches!(
        pipeline::repack_ramdisk(
            temp_dir.path(),
            &fakes.tools(&["mkbootfs"], &[]),
            &output,
            CompressedFormat::Gzip,
        ),
        Err(Error::Tool(tool::Error::Unavailable(_)))
    );
    assert!(!output.exists());
}
