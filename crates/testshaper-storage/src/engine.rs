//! Storage engine implementation using RocksDB

use crate::keys::{check_component, KeyBuilder};
use crate::options::StorageOptions;
use crate::store::{IdentityStore, PolicyStore};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteOptions};
use std::sync::Arc;
use testshaper_core::{Error, IdentityLockoutState, IdentityRecord, PolicySetting, Result, Scope};
use tracing::{debug, info};

/// Column family names
pub mod cf {
    pub const POLICY_SETTINGS: &str = "policy_settings";
    pub const IDENTITIES: &str = "identities";
}

/// All column families used by TestShaper
pub const COLUMN_FAMILIES: &[&str] = &[cf::POLICY_SETTINGS, cf::IDENTITIES];

/// RocksDB-backed store for policy settings and identity records
pub struct StorageEngine {
    db: Arc<DB>,
    options: StorageOptions,
}

impl StorageEngine {
    /// Open or create a new storage engine
    pub fn open(options: StorageOptions) -> Result<Self> {
        info!("Opening storage engine at {:?}", options.path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(options.create_if_missing);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(options.write_buffer_size);
        db_opts.set_max_background_jobs(options.max_background_jobs);

        if options.enable_compression {
            db_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                if options.enable_bloom_filter {
                    let mut block_opts = rocksdb::BlockBasedOptions::default();
                    block_opts
                        .set_bloom_filter(options.bloom_filter_bits_per_key as f64, false);
                    cf_opts.set_block_based_table_factory(&block_opts);
                }
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, &options.path, cf_descriptors)
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

        info!("Storage engine opened successfully");

        Ok(Self {
            db: Arc::new(db),
            options,
        })
    }

    /// Get the options the engine was opened with
    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    /// Get a reference to a column family
    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Internal(format!("Column family not found: {}", name)))
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.options.sync_wal);
        write_opts.disable_wal(!self.options.enable_wal);
        write_opts
    }

    fn put_record<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = bincode::serialize(value).map_err(|e| Error::Serialization(e.to_string()))?;
        let cf = self.cf(cf_name)?;
        self.db
            .put_cf_opt(cf, key, bytes, &self.write_options())
            .map_err(|e| Error::Storage(e.to_string()))
    }

    fn get_record<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key).map_err(|e| Error::Storage(e.to_string()))? {
            Some(bytes) => {
                let value = bincode::deserialize(&bytes)
                    .map_err(|e| Error::Deserialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Flush memtables to disk
    pub fn flush(&self) -> Result<()> {
        for name in COLUMN_FAMILIES {
            let cf = self.cf(name)?;
            self.db
                .flush_cf(cf)
                .map_err(|e| Error::Storage(e.to_string()))?;
        }
        Ok(())
    }
}

impl PolicyStore for StorageEngine {
    fn find_by_scope(&self, scope: &Scope) -> Result<Vec<PolicySetting>> {
        let prefix = KeyBuilder::policy_prefix(scope);
        let cf = self.cf(cf::POLICY_SETTINGS)?;

        let mut settings = Vec::new();
        for item in self.db.prefix_iterator_cf(cf, &prefix) {
            let (key, value) = item.map_err(|e| Error::Storage(e.to_string()))?;

            // Check if we're still in the prefix
            if !key.starts_with(&prefix) {
                break;
            }

            let setting: PolicySetting = bincode::deserialize(&value)
                .map_err(|e| Error::Deserialization(e.to_string()))?;
            settings.push(setting);
        }

        debug!("Loaded {} policy settings for scope {}", settings.len(), scope);
        Ok(settings)
    }

    fn find(&self, scope: &Scope, key: &str) -> Result<Option<PolicySetting>> {
        self.get_record(cf::POLICY_SETTINGS, &KeyBuilder::policy(scope, key))
    }

    fn upsert(&self, setting: &PolicySetting) -> Result<()> {
        check_component("scope id", setting.scope.id())?;
        check_component("setting key", &setting.key)?;
        let key = KeyBuilder::policy(&setting.scope, &setting.key);
        self.put_record(cf::POLICY_SETTINGS, &key, setting)?;
        debug!("Stored policy {} for scope {}", setting.key, setting.scope);
        Ok(())
    }
}

impl IdentityStore for StorageEngine {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<IdentityRecord>> {
        if check_component("identifier", identifier).is_err() {
            return Ok(None);
        }
        self.get_record(cf::IDENTITIES, &KeyBuilder::identity(identifier))
    }

    fn save_lockout(&self, identifier: &str, state: &IdentityLockoutState) -> Result<()> {
        let key = KeyBuilder::identity(identifier);
        let mut record: IdentityRecord = self
            .get_record(cf::IDENTITIES, &key)?
            .ok_or_else(|| Error::IdentityNotFound(identifier.to_string()))?;
        record.lockout = state.clone();
        self.put_record(cf::IDENTITIES, &key, &record)
    }

    fn create(&self, record: &IdentityRecord) -> Result<()> {
        check_component("identifier", &record.identifier)?;
        let key = KeyBuilder::identity(&record.identifier);
        if self.get_record::<IdentityRecord>(cf::IDENTITIES, &key)?.is_some() {
            return Err(Error::IdentityExists(record.identifier.clone()));
        }
        self.put_record(cf::IDENTITIES, &key, record)?;
        info!("Created identity {}", record.identifier);
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        let prefix = KeyBuilder::identity_prefix();
        let cf = self.cf(cf::IDENTITIES)?;

        let mut count = 0;
        for item in self.db.prefix_iterator_cf(cf, &prefix) {
            let (key, _) = item.map_err(|e| Error::Storage(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }
}
