//! sled keyspace, CBOR codec and transaction helpers
//!
//! Every record type lives in the one tree under its own key prefix so that a single sled
//! transaction can touch requests, orders, stock and movements together.
use super::error::{PersistenceError, WorkflowError, WorkflowResult};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};

pub const REQUEST_PREFIX: &str = "request/";
pub const ORDER_PREFIX: &str = "order/";
pub const STOCK_PREFIX: &str = "stock/";
pub const MOVEMENT_PREFIX: &str = "movement/";
pub const REQUEST_COUNTER: &str = "counter/request";
pub const ORDER_COUNTER: &str = "counter/order";

pub fn request_key(id: &str) -> String {
    format!("{REQUEST_PREFIX}{id}")
}

pub fn order_key(id: &str) -> String {
    format!("{ORDER_PREFIX}{id}")
}

pub fn stock_key(normalized_name: &str) -> String {
    format!("{STOCK_PREFIX}{normalized_name}")
}

pub fn movement_key(id: &str) -> String {
    format!("{MOVEMENT_PREFIX}{id}")
}

pub fn encode<T: minicbor::Encode<()>>(value: &T) -> WorkflowResult<Vec<u8>> {
    minicbor::to_vec(value).map_err(|e| PersistenceError::Codec(e.to_string()).into())
}

pub fn decode<T>(bytes: &[u8]) -> WorkflowResult<T>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    minicbor::decode(bytes).map_err(|e| PersistenceError::Codec(e.to_string()).into())
}

pub fn get<T>(db: &sled::Db, key: &str) -> WorkflowResult<Option<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    db.get(key)?.map(|bytes| decode(&bytes)).transpose()
}

pub fn scan<T>(db: &sled::Db, prefix: &str) -> WorkflowResult<Vec<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    db.scan_prefix(prefix)
        .values()
        .map(|bytes| decode(&bytes?))
        .collect()
}

pub type TxResult<T> = ConflictableTransactionResult<T, WorkflowError>;

pub fn abort<T>(error: WorkflowError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(error))
}

pub fn tx_get<T>(tx: &TransactionalTree, key: &str) -> TxResult<Option<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tx.get(key)? {
        Some(bytes) => match decode(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => abort(e),
        },
        None => Ok(None),
    }
}

pub fn tx_put<T: minicbor::Encode<()>>(tx: &TransactionalTree, key: &str, value: &T) -> TxResult<()> {
    match encode(value) {
        Ok(bytes) => {
            tx.insert(key, bytes)?;
            Ok(())
        }
        Err(e) => abort(e),
    }
}

/// Next value of a sequential counter, allocated inside the caller's transaction.
pub fn tx_next_number(tx: &TransactionalTree, counter: &str) -> TxResult<u64> {
    let current = match tx.get(counter)? {
        Some(bytes) => {
            let raw: [u8; 8] = match bytes.as_ref().try_into() {
                Ok(raw) => raw,
                Err(_) => {
                    return abort(
                        PersistenceError::Codec(format!("counter {counter} is corrupt")).into(),
                    );
                }
            };
            u64::from_be_bytes(raw)
        }
        None => 0,
    };
    let next = current + 1;
    tx.insert(counter, next.to_be_bytes().to_vec())?;
    Ok(next)
}

/// Runs `f` as one atomic sled transaction, flushing before returning.
pub fn run<A, F>(db: &sled::Db, f: F) -> WorkflowResult<A>
where
    F: Fn(&TransactionalTree) -> TxResult<A>,
{
    let outcome = db.transaction(f).map_err(|e| match e {
        TransactionError::Abort(error) => error,
        TransactionError::Storage(error) => error.into(),
    })?;
    db.flush()?;
    Ok(outcome)
}
