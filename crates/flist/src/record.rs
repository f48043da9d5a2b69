//! Typed records of the binary list format and the step cursor over them.

use crate::error::FlistError;
use crate::io::{ListIo, ListStream};

/// Signature word carried by every list header.
pub const LIST_SIGNATURE: u32 = 0x097E_78AB;
/// Signature word carried by every list trailer.
pub const TRAILER_SIGNATURE: u32 = 0x0BA8_7E79;
/// Number of per-tag flag words this implementation reads and writes.
pub const FLAG_WORDS: usize = 16;

/// Flag bit: the record carries a 16-bit permission field.
pub const FL_PERM: u32 = 1 << 0;
/// Flag bit: the record carries owner and group ids.
pub const FL_OWNER: u32 = 1 << 1;
/// Flag bit: the record carries a 16-byte MD5 digest.
pub const FL_MD5: u32 = 1 << 2;
/// Flag bit on id-map records: a real (numeric) id accompanies the name.
pub const FL_REAL_ID: u32 = 1 << 0;

/// One-byte tag opening every record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Tag {
    /// List header.
    Header = 0,
    /// Metadata placeholder for a directory whose contents appear later.
    DirMarker = 1,
    /// Opens the contents of one directory.
    DirStart = 2,
    /// Closes the innermost open directory.
    DirEnd = 3,
    /// Regular file.
    NormalFile = 4,
    /// Symbolic link.
    Symlink = 5,
    /// Character, block or fifo special node.
    DeviceSpecial = 6,
    /// Directory as a leaf child of another directory.
    Directory = 7,
    /// Descriptive include/exclude pattern.
    Filter = 8,
    /// User-id map entry.
    UidMap = 9,
    /// Group-id map entry.
    GidMap = 10,
    /// Regular file that is a member of a hard-link set.
    HardLink = 11,
    /// List trailer.
    Trailer = 12,
    /// Rolling/strong checksum block for the preceding file.
    Checksums = 13,
    /// Reference to another list file joined logically.
    Aggregate = 14,
    /// End marker for checksum data.
    ChecksumsEnd = 15,
}

impl TryFrom<u8> for Tag {
    type Error = FlistError;

    fn try_from(tag: u8) -> Result<Self, FlistError> {
        Ok(match tag {
            0 => Self::Header,
            1 => Self::DirMarker,
            2 => Self::DirStart,
            3 => Self::DirEnd,
            4 => Self::NormalFile,
            5 => Self::Symlink,
            6 => Self::DeviceSpecial,
            7 => Self::Directory,
            8 => Self::Filter,
            9 => Self::UidMap,
            10 => Self::GidMap,
            11 => Self::HardLink,
            12 => Self::Trailer,
            13 => Self::Checksums,
            14 => Self::Aggregate,
            15 => Self::ChecksumsEnd,
            tag => return Err(FlistError::UnknownTag { tag }),
        })
    }
}

/// List header: signature, format version, timestamp epoch and the per-tag
/// flag words that gate every optional record field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
    /// Format signature, [`LIST_SIGNATURE`] on every valid list.
    pub signature: u32,
    /// Major format version.
    pub major_version: u16,
    /// Minor format version.
    pub minor_version: u16,
    /// Base timestamp; record mtimes are signed offsets against it.
    pub epoch: u64,
    /// Per-tag feature bits, indexed by [`Tag`].
    pub flags: [u32; FLAG_WORDS],
}

impl Default for Header {
    fn default() -> Self {
        Self::with_epoch(0)
    }
}

impl Header {
    /// Creates a header whose epoch is the current wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        let epoch = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::with_epoch(epoch)
    }

    /// Creates a header with an explicit epoch.
    #[must_use]
    pub fn with_epoch(epoch: u64) -> Self {
        Self {
            signature: LIST_SIGNATURE,
            major_version: 0,
            minor_version: 1,
            epoch,
            flags: [0; FLAG_WORDS],
        }
    }

    /// Returns the flag word for `tag`.
    #[must_use]
    pub fn flags_for(&self, tag: Tag) -> u32 {
        self.flags[tag as usize]
    }

    fn read<S: ListStream>(io: &mut ListIo<S>) -> Result<Self, FlistError> {
        let signature = io.read_int(4)? as u32;
        if signature != LIST_SIGNATURE {
            return Err(FlistError::BadSignature { found: signature });
        }
        let major_version = io.read_int(2)? as u16;
        let minor_version = io.read_int(2)? as u16;
        let epoch = io.read_num()?;
        let flag_count = io.read_int(1)? as usize;

        // A longer header from a newer writer is fine: the extra flag words
        // are read and discarded.
        let mut flags = [0u32; FLAG_WORDS];
        for index in 0..flag_count {
            let word = io.read_int(4)? as u32;
            if index < FLAG_WORDS {
                flags[index] = word;
            }
        }

        Ok(Self {
            signature,
            major_version,
            minor_version,
            epoch,
            flags,
        })
    }

    pub(crate) fn write<S: ListStream>(&self, io: &mut ListIo<S>) -> Result<(), FlistError> {
        io.write_int(u64::from(Tag::Header as u8), 1)?;
        io.write_int(u64::from(self.signature), 4)?;
        io.write_int(u64::from(self.major_version), 2)?;
        io.write_int(u64::from(self.minor_version), 2)?;
        io.write_num(self.epoch)?;
        io.write_int(FLAG_WORDS as u64, 1)?;
        for word in self.flags {
            io.write_int(u64::from(word), 4)?;
        }
        Ok(())
    }
}

/// Attributes shared by every entity-bearing record.
///
/// `perm`, `uid` and `gid` travel on the wire only when the header flag
/// word for the record's tag says so; decoded records leave absent fields
/// zero and readers consult the flags, never the values, for presence.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Entity {
    /// Modification time as a signed offset from the header epoch.
    pub mtime: i32,
    /// Permission bits (no file-type bits).
    pub perm: u16,
    /// Owner id.
    pub uid: u64,
    /// Group id.
    pub gid: u64,
    /// Entity name; directory names end with `/`, marker names may be
    /// rewritten to absolute paths by consumers.
    pub name: String,
}

impl Entity {
    fn read<S: ListStream>(io: &mut ListIo<S>, flags: u32) -> Result<Self, FlistError> {
        let mtime = io.read_i32()?;
        let perm = if flags & FL_PERM != 0 {
            io.read_int(2)? as u16
        } else {
            0
        };
        let (uid, gid) = if flags & FL_OWNER != 0 {
            (io.read_num()?, io.read_num()?)
        } else {
            (0, 0)
        };
        let name = io.read_string()?;
        Ok(Self {
            mtime,
            perm,
            uid,
            gid,
            name,
        })
    }

    fn write<S: ListStream>(&self, io: &mut ListIo<S>, flags: u32) -> Result<(), FlistError> {
        io.write_i32(self.mtime)?;
        if flags & FL_PERM != 0 {
            io.write_int(u64::from(self.perm), 2)?;
        }
        if flags & FL_OWNER != 0 {
            io.write_num(self.uid)?;
            io.write_num(self.gid)?;
        }
        io.write_string(&self.name)
    }
}

/// Regular-file payload shared by [`Record::NormalFile`] and hard links.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileRecord {
    /// Common entity attributes.
    pub entity: Entity,
    /// File size in bytes.
    pub size: u64,
    /// Whole-file MD5; meaningful only when `FL_MD5` is set for the tag.
    pub md5: [u8; 16],
}

impl FileRecord {
    fn read<S: ListStream>(io: &mut ListIo<S>, tag: Tag) -> Result<Self, FlistError> {
        let flags = io.header.flags_for(tag);
        let mtime = io.read_i32()?;
        Self::read_after_mtime(io, flags, mtime)
    }

    fn read_after_mtime<S: ListStream>(
        io: &mut ListIo<S>,
        flags: u32,
        mtime: i32,
    ) -> Result<Self, FlistError> {
        let perm = if flags & FL_PERM != 0 {
            io.read_int(2)? as u16
        } else {
            0
        };
        let (uid, gid) = if flags & FL_OWNER != 0 {
            (io.read_num()?, io.read_num()?)
        } else {
            (0, 0)
        };
        let name = io.read_string()?;
        let size = io.read_num()?;
        let mut md5 = [0u8; 16];
        if flags & FL_MD5 != 0 {
            io.read_exact(&mut md5)?;
        }
        Ok(Self {
            entity: Entity {
                mtime,
                perm,
                uid,
                gid,
                name,
            },
            size,
            md5,
        })
    }

    fn write<S: ListStream>(
        &self,
        io: &mut ListIo<S>,
        tag: Tag,
        serial: Option<u64>,
    ) -> Result<(), FlistError> {
        let flags = io.header.flags_for(tag);
        io.write_int(u64::from(tag as u8), 1)?;
        io.write_i32(self.entity.mtime)?;
        if let Some(serial) = serial {
            io.write_num(serial)?;
        }
        if flags & FL_PERM != 0 {
            io.write_int(u64::from(self.entity.perm), 2)?;
        }
        if flags & FL_OWNER != 0 {
            io.write_num(self.entity.uid)?;
            io.write_num(self.entity.gid)?;
        }
        io.write_string(&self.entity.name)?;
        io.write_num(self.size)?;
        if flags & FL_MD5 != 0 {
            io.write_bytes(&self.md5)?;
        }
        Ok(())
    }
}

/// Hard-link record: a regular file plus the serial of its link set.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HardLinkRecord {
    /// The file payload (size and digest are shared by the whole set).
    pub file: FileRecord,
    /// Link-set serial; equal serials refer to one underlying file.
    pub serial: u64,
}

impl HardLinkRecord {
    fn read<S: ListStream>(io: &mut ListIo<S>) -> Result<Self, FlistError> {
        let flags = io.header.flags_for(Tag::HardLink);
        let mtime = io.read_i32()?;
        let serial = io.read_num()?;
        let file = FileRecord::read_after_mtime(io, flags, mtime)?;
        Ok(Self { file, serial })
    }
}

/// Symbolic-link record.
///
/// On the wire the target is compressed against the previous symlink's
/// target: a prefix count borrows leading bytes from it, and the high bit
/// of the count appends the link's own name as a suffix.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SymlinkRecord {
    /// Common entity attributes (no permission field; links have none).
    pub entity: Entity,
    /// Fully reconstructed link target.
    pub target: String,
}

impl SymlinkRecord {
    fn read<S: ListStream>(io: &mut ListIo<S>) -> Result<Self, FlistError> {
        let flags = io.header.flags_for(Tag::Symlink);
        let mtime = io.read_i32()?;
        let (uid, gid) = if flags & FL_OWNER != 0 {
            (io.read_num()?, io.read_num()?)
        } else {
            (0, 0)
        };
        let name = io.read_string()?;
        let compress = io.read_int(1)? as u8;
        let payload = io.read_blob()?;

        let prefix = usize::from(compress & 0x7f);
        let last = io.last_symlink.as_bytes();
        if prefix > last.len() {
            return Err(FlistError::BadSymlinkCompression { prefix });
        }
        let mut target = Vec::with_capacity(prefix + payload.len() + name.len());
        target.extend_from_slice(&last[..prefix]);
        target.extend_from_slice(&payload);
        if compress & 0x80 != 0 {
            target.extend_from_slice(name.as_bytes());
        }
        let target = String::from_utf8(target).map_err(|_| FlistError::InvalidString)?;
        io.last_symlink = target.clone();

        Ok(Self {
            entity: Entity {
                mtime,
                perm: 0,
                uid,
                gid,
                name,
            },
            target,
        })
    }

    fn write<S: ListStream>(&self, io: &mut ListIo<S>) -> Result<(), FlistError> {
        let flags = io.header.flags_for(Tag::Symlink);
        io.write_int(u64::from(Tag::Symlink as u8), 1)?;
        io.write_i32(self.entity.mtime)?;
        if flags & FL_OWNER != 0 {
            io.write_num(self.entity.uid)?;
            io.write_num(self.entity.gid)?;
        }
        io.write_string(&self.entity.name)?;

        let target = self.target.as_bytes();
        let name = self.entity.name.as_bytes();
        let trail = target.ends_with(name);
        let effective = if trail {
            &target[..target.len() - name.len()]
        } else {
            target
        };
        let last = io.last_symlink.as_bytes();
        let mut prefix = 0usize;
        while prefix < effective.len()
            && prefix < last.len()
            && prefix < 0x7f
            && effective[prefix] == last[prefix]
        {
            prefix += 1;
        }
        let mut compress = prefix as u8;
        if trail {
            compress |= 0x80;
        }
        io.write_int(u64::from(compress), 1)?;
        io.write_blob(&effective[prefix..])?;
        io.last_symlink = self.target.clone();
        Ok(())
    }
}

/// Device-special record; permissions are always present on the wire.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeviceRecord {
    /// Common entity attributes.
    pub entity: Entity,
    /// Device number of the node itself.
    pub dev: u64,
}

impl DeviceRecord {
    fn read<S: ListStream>(io: &mut ListIo<S>) -> Result<Self, FlistError> {
        let flags = io.header.flags_for(Tag::DeviceSpecial);
        let mtime = io.read_i32()?;
        let perm = io.read_int(2)? as u16;
        let (uid, gid) = if flags & FL_OWNER != 0 {
            (io.read_num()?, io.read_num()?)
        } else {
            (0, 0)
        };
        let dev = io.read_num()?;
        let name = io.read_string()?;
        Ok(Self {
            entity: Entity {
                mtime,
                perm,
                uid,
                gid,
                name,
            },
            dev,
        })
    }

    fn write<S: ListStream>(&self, io: &mut ListIo<S>) -> Result<(), FlistError> {
        let flags = io.header.flags_for(Tag::DeviceSpecial);
        io.write_int(u64::from(Tag::DeviceSpecial as u8), 1)?;
        io.write_i32(self.entity.mtime)?;
        io.write_int(u64::from(self.entity.perm), 2)?;
        if flags & FL_OWNER != 0 {
            io.write_num(self.entity.uid)?;
            io.write_num(self.entity.gid)?;
        }
        io.write_num(self.dev)?;
        io.write_string(&self.entity.name)
    }
}

/// Direction of a descriptive filter record.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FilterKind {
    /// Matching entries were accepted.
    #[default]
    Include,
    /// Matching entries were rejected.
    Exclude,
}

/// Descriptive include/exclude pattern carried in the list.
///
/// These records document the producer's filters; readers are not required
/// to re-apply them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FilterRecord {
    /// Rule direction.
    pub kind: FilterKind,
    /// Glob pattern text.
    pub pattern: String,
}

impl FilterRecord {
    fn read<S: ListStream>(io: &mut ListIo<S>) -> Result<Self, FlistError> {
        let kind = match io.read_int(1)? {
            1 => FilterKind::Include,
            2 => FilterKind::Exclude,
            other => {
                return Err(FlistError::BadFilterType { kind: other as u8 });
            }
        };
        Ok(Self {
            kind,
            pattern: io.read_string()?,
        })
    }

    fn write<S: ListStream>(&self, io: &mut ListIo<S>) -> Result<(), FlistError> {
        io.write_int(u64::from(Tag::Filter as u8), 1)?;
        let kind = match self.kind {
            FilterKind::Include => 1u64,
            FilterKind::Exclude => 2u64,
        };
        io.write_int(kind, 1)?;
        io.write_string(&self.pattern)
    }
}

/// Uid/gid map record relating an in-list id to a name (and optionally a
/// numeric id on the producing host).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IdMapRecord {
    /// Id as used by records within this list.
    pub file_id: u64,
    /// Numeric id on the producing host; gated by [`FL_REAL_ID`].
    pub real_id: u64,
    /// Symbolic name of the user or group.
    pub name: String,
}

impl IdMapRecord {
    fn read<S: ListStream>(io: &mut ListIo<S>, tag: Tag) -> Result<Self, FlistError> {
        let flags = io.header.flags_for(tag);
        let file_id = io.read_num()?;
        let real_id = if flags & FL_REAL_ID != 0 {
            io.read_num()?
        } else {
            0
        };
        let name = io.read_string()?;
        Ok(Self {
            file_id,
            real_id,
            name,
        })
    }

    fn write<S: ListStream>(&self, io: &mut ListIo<S>, tag: Tag) -> Result<(), FlistError> {
        let flags = io.header.flags_for(tag);
        io.write_int(u64::from(tag as u8), 1)?;
        io.write_num(self.file_id)?;
        if flags & FL_REAL_ID != 0 {
            io.write_num(self.real_id)?;
        }
        io.write_string(&self.name)
    }
}

/// List trailer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Trailer {
    /// Trailer signature, [`TRAILER_SIGNATURE`] on every valid list.
    pub signature: u32,
}

impl Default for Trailer {
    fn default() -> Self {
        Self::new()
    }
}

impl Trailer {
    /// Creates a trailer with the format signature.
    #[must_use]
    pub fn new() -> Self {
        Self {
            signature: TRAILER_SIGNATURE,
        }
    }

    fn read<S: ListStream>(io: &mut ListIo<S>) -> Result<Self, FlistError> {
        let signature = io.read_int(4)? as u32;
        if signature != TRAILER_SIGNATURE {
            return Err(FlistError::BadTrailerSignature { found: signature });
        }
        Ok(Self { signature })
    }

    fn write<S: ListStream>(&self, io: &mut ListIo<S>) -> Result<(), FlistError> {
        io.write_int(u64::from(Tag::Trailer as u8), 1)?;
        io.write_int(u64::from(self.signature), 4)
    }
}

/// Rolling/strong checksum block for one regular file.
///
/// `sums` is a flat array of 20-byte tuples, one per block: a 4-byte
/// big-endian rolling sum followed by a 16-byte MD4 digest. When the file
/// size is not a block multiple the final tuple is the sentinel covering
/// the partial tail; it must never enter a matcher index.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChecksumBlock {
    /// Uniform block size the sums were computed over.
    pub block_size: u64,
    /// Size of the described file in bytes.
    pub file_size: u64,
    /// Flat array of 20-byte checksum tuples.
    pub sums: Vec<u8>,
}

impl ChecksumBlock {
    /// Bytes per checksum tuple: 4 of rolling sum, 16 of MD4.
    pub const TUPLE_LEN: usize = 20;
    /// Rolling value marking the sentinel tuple for a partial tail block.
    pub const SENTINEL: u32 = 0xDEAD_BEEF;

    /// Total number of tuples, including any sentinel.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.sums.len() / Self::TUPLE_LEN
    }

    /// Number of full-size blocks, the only ones a matcher may index.
    #[must_use]
    pub fn full_block_count(&self) -> usize {
        if self.block_size == 0 {
            0
        } else {
            (self.file_size / self.block_size) as usize
        }
    }

    /// Returns `true` if the final tuple is the partial-tail sentinel.
    #[must_use]
    pub fn has_sentinel(&self) -> bool {
        self.block_size != 0 && self.file_size % self.block_size != 0
    }

    /// Rolling sum of tuple `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn rolling(&self, index: usize) -> u32 {
        let at = index * Self::TUPLE_LEN;
        u32::from_be_bytes(self.sums[at..at + 4].try_into().expect("4 bytes"))
    }

    /// Strong (MD4) sum of tuple `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn strong(&self, index: usize) -> &[u8] {
        let at = index * Self::TUPLE_LEN + 4;
        &self.sums[at..at + 16]
    }

    fn expected_len(block_size: u64, file_size: u64) -> Result<usize, FlistError> {
        if block_size == 0 {
            if file_size == 0 {
                return Ok(0);
            }
            return Err(FlistError::InvalidChecksumBlock {
                block_size,
                file_size,
            });
        }
        let blocks = file_size.div_ceil(block_size);
        blocks
            .checked_mul(Self::TUPLE_LEN as u64)
            .and_then(|len| usize::try_from(len).ok())
            .ok_or(FlistError::InvalidChecksumBlock {
                block_size,
                file_size,
            })
    }

    fn read<S: ListStream>(io: &mut ListIo<S>) -> Result<Self, FlistError> {
        let block_size = io.read_num()?;
        let file_size = io.read_num()?;
        let len = Self::expected_len(block_size, file_size)?;
        let mut sums = vec![0u8; len];
        io.read_exact(&mut sums)?;
        Ok(Self {
            block_size,
            file_size,
            sums,
        })
    }

    fn write<S: ListStream>(&self, io: &mut ListIo<S>) -> Result<(), FlistError> {
        let len = Self::expected_len(self.block_size, self.file_size)?;
        debug_assert_eq!(len, self.sums.len());
        io.write_int(u64::from(Tag::Checksums as u8), 1)?;
        io.write_num(self.block_size)?;
        io.write_num(self.file_size)?;
        io.write_bytes(&self.sums)
    }
}

/// Reference to another list file joined logically into this one.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AggregateFile {
    /// Path of the referenced list file.
    pub file: String,
}

impl AggregateFile {
    fn read<S: ListStream>(io: &mut ListIo<S>) -> Result<Self, FlistError> {
        Ok(Self {
            file: io.read_string()?,
        })
    }

    fn write<S: ListStream>(&self, io: &mut ListIo<S>) -> Result<(), FlistError> {
        io.write_int(u64::from(Tag::Aggregate as u8), 1)?;
        io.write_string(&self.file)
    }
}

/// One decoded record of a list stream.
///
/// The cursor exposes the currently decoded variant through this sum;
/// [`entity`](Record::entity) and [`file`](Record::file) give uniform
/// access to the attributes shared across variants.
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    /// List header.
    Header(Header),
    /// Forward metadata reference to a directory listed later.
    DirMarker(Entity),
    /// Opens one directory's contents.
    DirStart(Entity),
    /// Closes the innermost open directory.
    DirEnd,
    /// Directory as a leaf child.
    Directory(Entity),
    /// Regular file.
    NormalFile(FileRecord),
    /// Symbolic link.
    Symlink(SymlinkRecord),
    /// Device-special node.
    DeviceSpecial(DeviceRecord),
    /// Descriptive filter pattern.
    Filter(FilterRecord),
    /// User-id map entry.
    UidMap(IdMapRecord),
    /// Group-id map entry.
    GidMap(IdMapRecord),
    /// Hard-link set member.
    HardLink(HardLinkRecord),
    /// List trailer.
    Trailer(Trailer),
    /// Checksum block.
    Checksums(ChecksumBlock),
    /// Aggregate list reference.
    Aggregate(AggregateFile),
    /// End of checksum data.
    ChecksumsEnd,
}

impl Record {
    /// Reads the next record from the stream.
    ///
    /// Header records update the codec context as a side effect, so
    /// subsequent records decode with the right flag masks.
    pub fn step<S: ListStream>(io: &mut ListIo<S>) -> Result<Self, FlistError> {
        let tag = Tag::try_from(io.read_int(1)? as u8)?;
        Ok(match tag {
            Tag::Header => {
                let header = Header::read(io)?;
                io.header = header.clone();
                Self::Header(header)
            }
            Tag::DirMarker | Tag::DirStart | Tag::Directory => {
                let flags = io.header.flags_for(tag);
                let entity = Entity::read(io, flags)?;
                match tag {
                    Tag::DirMarker => Self::DirMarker(entity),
                    Tag::DirStart => Self::DirStart(entity),
                    _ => Self::Directory(entity),
                }
            }
            Tag::DirEnd => Self::DirEnd,
            Tag::NormalFile => Self::NormalFile(FileRecord::read(io, tag)?),
            Tag::Symlink => Self::Symlink(SymlinkRecord::read(io)?),
            Tag::DeviceSpecial => Self::DeviceSpecial(DeviceRecord::read(io)?),
            Tag::Filter => Self::Filter(FilterRecord::read(io)?),
            Tag::UidMap => Self::UidMap(IdMapRecord::read(io, tag)?),
            Tag::GidMap => Self::GidMap(IdMapRecord::read(io, tag)?),
            Tag::HardLink => Self::HardLink(HardLinkRecord::read(io)?),
            Tag::Trailer => Self::Trailer(Trailer::read(io)?),
            Tag::Checksums => Self::Checksums(ChecksumBlock::read(io)?),
            Tag::Aggregate => Self::Aggregate(AggregateFile::read(io)?),
            Tag::ChecksumsEnd => Self::ChecksumsEnd,
        })
    }

    /// Writes this record, including its tag byte.
    ///
    /// Writing a header installs it as the codec context first, so the
    /// records that follow encode with its flag masks.
    pub fn write<S: ListStream>(&self, io: &mut ListIo<S>) -> Result<(), FlistError> {
        match self {
            Self::Header(header) => {
                io.header = header.clone();
                header.write(io)
            }
            Self::DirMarker(entity) => Self::write_dir(io, Tag::DirMarker, entity),
            Self::DirStart(entity) => Self::write_dir(io, Tag::DirStart, entity),
            Self::DirEnd => io.write_int(u64::from(Tag::DirEnd as u8), 1),
            Self::Directory(entity) => Self::write_dir(io, Tag::Directory, entity),
            Self::NormalFile(file) => file.write(io, Tag::NormalFile, None),
            Self::Symlink(link) => link.write(io),
            Self::DeviceSpecial(dev) => dev.write(io),
            Self::Filter(filter) => filter.write(io),
            Self::UidMap(map) => map.write(io, Tag::UidMap),
            Self::GidMap(map) => map.write(io, Tag::GidMap),
            Self::HardLink(link) => link.file.write(io, Tag::HardLink, Some(link.serial)),
            Self::Trailer(trailer) => trailer.write(io),
            Self::Checksums(block) => block.write(io),
            Self::Aggregate(aggregate) => aggregate.write(io),
            Self::ChecksumsEnd => io.write_int(u64::from(Tag::ChecksumsEnd as u8), 1),
        }
    }

    fn write_dir<S: ListStream>(
        io: &mut ListIo<S>,
        tag: Tag,
        entity: &Entity,
    ) -> Result<(), FlistError> {
        let flags = io.header.flags_for(tag);
        io.write_int(u64::from(tag as u8), 1)?;
        entity.write(io, flags)
    }

    /// Returns this record's tag.
    #[must_use]
    pub fn tag(&self) -> Tag {
        match self {
            Self::Header(_) => Tag::Header,
            Self::DirMarker(_) => Tag::DirMarker,
            Self::DirStart(_) => Tag::DirStart,
            Self::DirEnd => Tag::DirEnd,
            Self::Directory(_) => Tag::Directory,
            Self::NormalFile(_) => Tag::NormalFile,
            Self::Symlink(_) => Tag::Symlink,
            Self::DeviceSpecial(_) => Tag::DeviceSpecial,
            Self::Filter(_) => Tag::Filter,
            Self::UidMap(_) => Tag::UidMap,
            Self::GidMap(_) => Tag::GidMap,
            Self::HardLink(_) => Tag::HardLink,
            Self::Trailer(_) => Tag::Trailer,
            Self::Checksums(_) => Tag::Checksums,
            Self::Aggregate(_) => Tag::Aggregate,
            Self::ChecksumsEnd => Tag::ChecksumsEnd,
        }
    }

    /// Returns the shared entity attributes if this record carries them.
    #[must_use]
    pub fn entity(&self) -> Option<&Entity> {
        match self {
            Self::DirMarker(entity) | Self::DirStart(entity) | Self::Directory(entity) => {
                Some(entity)
            }
            Self::NormalFile(file) => Some(&file.entity),
            Self::Symlink(link) => Some(&link.entity),
            Self::DeviceSpecial(dev) => Some(&dev.entity),
            Self::HardLink(link) => Some(&link.file.entity),
            _ => None,
        }
    }

    /// Mutable access to the shared entity attributes.
    #[must_use]
    pub fn entity_mut(&mut self) -> Option<&mut Entity> {
        match self {
            Self::DirMarker(entity) | Self::DirStart(entity) | Self::Directory(entity) => {
                Some(entity)
            }
            Self::NormalFile(file) => Some(&mut file.entity),
            Self::Symlink(link) => Some(&mut link.entity),
            Self::DeviceSpecial(dev) => Some(&mut dev.entity),
            Self::HardLink(link) => Some(&mut link.file.entity),
            _ => None,
        }
    }

    /// Returns the file payload for regular files and hard links.
    #[must_use]
    pub fn file(&self) -> Option<&FileRecord> {
        match self {
            Self::NormalFile(file) => Some(file),
            Self::HardLink(link) => Some(&link.file),
            _ => None,
        }
    }
}
