use futures::executor::block_on;
use quickcheck_macros::quickcheck;
use streamzip::zip::structures::{
    CentralDirectoryHeader, DATA_DESCRIPTOR_SIGNATURE, DataDescriptor, EndOfCentralDirectory,
    FLAG_DATA_DESCRIPTOR, LFH_SIGNATURE, LocalFileHeader,
};
use streamzip::{ArchiveOptions, EntryMetadata, InputDescriptor, ZipStream, download_zip, predict_length};

use crate::read_back;

fn build(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let descriptors = entries
        .iter()
        .map(|(name, data)| Ok(InputDescriptor::new(data.clone()).name(name.as_str())))
        .collect::<Vec<_>>();
    let response = download_zip(futures::stream::iter(descriptors), ArchiveOptions::default()).unwrap();
    block_on(response.bytes()).unwrap()
}

#[test]
fn local_headers_defer_crc_and_sizes() {
    let bytes = build(&[("a.txt".to_string(), b"abc".to_vec())]);

    let header = LocalFileHeader::from_bytes(&bytes).unwrap();
    assert_ne!(header.flags & FLAG_DATA_DESCRIPTOR, 0);
    assert_eq!(header.crc32, 0);
    assert_eq!(header.compressed_size, 0);
    assert_eq!(header.uncompressed_size, 0);
    assert_eq!(header.version_needed, 20);

    let descriptor_at = LocalFileHeader::SIZE + 5 + 3;
    assert_eq!(
        &bytes[descriptor_at..descriptor_at + 4],
        &DATA_DESCRIPTOR_SIGNATURE.to_le_bytes()
    );
    let descriptor = DataDescriptor::from_bytes(&bytes[descriptor_at..]).unwrap();
    assert_eq!(descriptor.crc32, crc32fast::hash(b"abc"));
    assert_eq!(descriptor.compressed_size, 3);
    assert_eq!(descriptor.uncompressed_size, 3);
}

#[test]
fn central_directory_matches_descriptors() {
    let bytes = build(&[
        ("one".to_string(), b"first".to_vec()),
        ("two".to_string(), Vec::new()),
        ("three".to_string(), vec![7; 1000]),
    ]);

    let eocd = EndOfCentralDirectory::from_bytes(&bytes[bytes.len() - EndOfCentralDirectory::SIZE..]).unwrap();
    assert_eq!(eocd.total_entries, 3);
    assert_eq!(eocd.disk_entries, 3);
    assert_eq!(
        eocd.cd_offset as usize + eocd.cd_size as usize + EndOfCentralDirectory::SIZE,
        bytes.len()
    );

    let mut offset = eocd.cd_offset as usize;
    for _ in 0..eocd.total_entries {
        let header = CentralDirectoryHeader::from_bytes(&bytes[offset..]).unwrap();
        assert_eq!(header.version_made_by, 0x0315);
        assert_eq!(header.external_attrs, 0o100644 << 16);
        assert_eq!(header.compressed_size, header.uncompressed_size);

        let lfh = header.lfh_offset as usize;
        let local = LocalFileHeader::from_bytes(&bytes[lfh..]).unwrap();
        let name_at = lfh + LocalFileHeader::SIZE;
        let name_len = header.file_name_length as usize;
        assert_eq!(
            &bytes[name_at..name_at + name_len],
            &bytes[offset + CentralDirectoryHeader::SIZE..offset + CentralDirectoryHeader::SIZE + name_len]
        );
        assert_eq!(local.flags, header.flags);
        assert_eq!(local.modified, header.modified);

        let descriptor_at = name_at + name_len + header.uncompressed_size as usize;
        let descriptor = DataDescriptor::from_bytes(&bytes[descriptor_at..]).unwrap();
        assert_eq!(descriptor.crc32, header.crc32);
        assert_eq!(descriptor.uncompressed_size, header.uncompressed_size);

        offset += CentralDirectoryHeader::SIZE + name_len;
    }
}

#[test]
fn empty_archive() {
    let bytes = block_on(
        ZipStream::from_descriptors(Vec::new(), &ArchiveOptions::default())
            .next_chunk(),
    )
    .unwrap()
    .unwrap();
    assert_eq!(bytes.len(), 22);
    assert!(read_back(&bytes).is_empty());
}

#[quickcheck]
fn offsets_and_length_are_exact(contents: Vec<Vec<u8>>) -> bool {
    let entries: Vec<(String, Vec<u8>)> = contents
        .into_iter()
        .enumerate()
        .map(|(i, data)| (format!("dir/entry-{i}.bin"), data))
        .collect();
    let bytes = build(&entries);

    let metadata: Vec<EntryMetadata> = entries
        .iter()
        .map(|(name, data)| EntryMetadata::new(name.as_str(), data.len() as u64))
        .collect();
    if predict_length(&metadata).unwrap() != bytes.len() as u64 {
        return false;
    }

    let eocd = EndOfCentralDirectory::from_bytes(&bytes[bytes.len() - 22..]).unwrap();
    let mut offset = eocd.cd_offset as usize;
    for _ in 0..eocd.total_entries {
        let header = CentralDirectoryHeader::from_bytes(&bytes[offset..]).unwrap();
        let lfh = header.lfh_offset as usize;
        if bytes[lfh..lfh + 4] != LFH_SIGNATURE.to_le_bytes() {
            return false;
        }
        offset += CentralDirectoryHeader::SIZE + header.file_name_length as usize;
    }

    read_back(&bytes) == entries
}
