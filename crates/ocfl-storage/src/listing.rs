/// What kind of entry a listing row describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListingType {
    File,
    Directory,
    Other,
}

/// One entry of a directory listing.
///
/// For [`Storage::list_directory`](crate::Storage::list_directory) the path
/// is a bare name; for `list_recursive` it is relative to the listed root.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Listing {
    pub kind: ListingType,
    pub relative: String,
}

impl Listing {
    pub fn file(relative: impl Into<String>) -> Self {
        Self {
            kind: ListingType::File,
            relative: relative.into(),
        }
    }

    pub fn directory(relative: impl Into<String>) -> Self {
        Self {
            kind: ListingType::Directory,
            relative: relative.into(),
        }
    }

    pub fn other(relative: impl Into<String>) -> Self {
        Self {
            kind: ListingType::Other,
            relative: relative.into(),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == ListingType::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == ListingType::Directory
    }
}
