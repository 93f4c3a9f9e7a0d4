//! Typed ONTAP REST endpoints.
//!
//! Each method maps to one ONTAP collection or resource and returns typed
//! records. Collection endpoints request `fields=*` and unwrap the `records`
//! envelope. Mutations take a prepared JSON body; the tools layer builds it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::{ClientError, ClusterClient};

/// Interval between async job status checks.
pub const JOB_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Number of status checks before giving up on a job.
pub const JOB_POLL_ATTEMPTS: u32 = 10;

#[derive(Debug, Deserialize)]
struct Records<T> {
    #[serde(default = "Vec::new")]
    records: Vec<T>,
}

/// `{uuid, name}` reference embedded in most ONTAP records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterVersion {
    #[serde(default)]
    pub full: String,
    #[serde(default)]
    pub generation: u32,
    #[serde(default)]
    pub major: u32,
    #[serde(default)]
    pub minor: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub version: ClusterVersion,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Svm {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockStorageSpace {
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub available: i64,
    #[serde(default)]
    pub used: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateSpace {
    #[serde(default)]
    pub block_storage: BlockStorageSpace,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Aggregate {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<AggregateSpace>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeSpace {
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub available: i64,
    #[serde(default)]
    pub used: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportPolicyRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeNas {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_policy: Option<ExportPolicyRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeQos {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<ObjectRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Autosize {
    #[serde(default)]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grow_threshold: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shrink_threshold: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
}

/// Read/write/other/total breakdown used by ONTAP performance metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricBreakdown {
    #[serde(default)]
    pub read: i64,
    #[serde(default)]
    pub write: i64,
    #[serde(default)]
    pub other: i64,
    #[serde(default)]
    pub total: i64,
}

/// Most recent performance sample of a volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeMetric {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iops: Option<MetricBreakdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput: Option<MetricBreakdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<MetricBreakdown>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Volume {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svm: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregates: Vec<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<VolumeSpace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nas: Option<VolumeNas>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qos: Option<VolumeQos>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_policy: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autosize: Option<Autosize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<VolumeMetric>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotPolicyCopy {
    #[serde(default)]
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotPolicy {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub copies: Vec<SnapshotPolicyCopy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svm: Option<ObjectRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<Value>,
    /// ISO 8601 duration for interval schedules, e.g. `PT1H`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QosFixed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_throughput_iops: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_throughput_mbps: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_throughput_iops: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QosAdaptive {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_iops: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_iops: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_iops_allocation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_iops_allocation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QosPolicy {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svm: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<QosFixed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adaptive: Option<QosAdaptive>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CifsAcl {
    #[serde(default)]
    pub user_or_group: String,
    #[serde(default)]
    pub permission: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CifsShare {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svm: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acls: Vec<CifsAcl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_based_enumeration: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oplocks: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_files: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportClient {
    #[serde(rename = "match", default)]
    pub pattern: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportRule {
    #[serde(default)]
    pub index: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clients: Vec<ExportClient>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ro_rule: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rw_rule: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub superuser: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportPolicy {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svm: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<ExportRule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct JobRef {
    #[serde(default)]
    uuid: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct JobStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    message: String,
}

impl ClusterClient {
    /// `GET /cluster`. Accepts both the direct object and a `records` envelope.
    pub async fn cluster_info(&self, cancel: &CancellationToken) -> Result<ClusterInfo, ClientError> {
        let value: Value = self.get(cancel, "/cluster", &[]).await?;
        if let Some(first) = value.get("records").and_then(|r| r.get(0)) {
            return decode(first.clone(), "/cluster");
        }
        if value.get("records").is_some() {
            return Err(ClientError::InvalidResponse(
                "no cluster information returned".to_string(),
            ));
        }
        decode(value, "/cluster")
    }

    /// `GET /svm/svms`
    pub async fn list_svms(&self, cancel: &CancellationToken) -> Result<Vec<Svm>, ClientError> {
        self.records(cancel, "/svm/svms", &[("fields", "uuid,name,state,subtype")])
            .await
    }

    /// `GET /storage/aggregates`, optionally scoped to an SVM.
    pub async fn list_aggregates(
        &self,
        cancel: &CancellationToken,
        svm: Option<&str>,
    ) -> Result<Vec<Aggregate>, ClientError> {
        let mut query = vec![("fields", "*")];
        if let Some(svm) = svm {
            query.push(("svm.name", svm));
        }
        self.records(cancel, "/storage/aggregates", &query).await
    }

    /// `GET /storage/volumes`, optionally scoped to an SVM.
    pub async fn list_volumes(
        &self,
        cancel: &CancellationToken,
        svm: Option<&str>,
    ) -> Result<Vec<Volume>, ClientError> {
        let mut query = vec![("fields", "*")];
        if let Some(svm) = svm {
            query.push(("svm.name", svm));
        }
        self.records(cancel, "/storage/volumes", &query).await
    }

    /// `GET /storage/volumes/{uuid}`
    pub async fn get_volume(&self, cancel: &CancellationToken, uuid: &str) -> Result<Volume, ClientError> {
        self.get(cancel, &format!("/storage/volumes/{uuid}"), &[("fields", "*")])
            .await
    }

    /// Find a volume by name within an SVM.
    pub async fn find_volume(
        &self,
        cancel: &CancellationToken,
        svm: &str,
        name: &str,
    ) -> Result<Option<Volume>, ClientError> {
        let volumes: Vec<Volume> = self
            .records(
                cancel,
                "/storage/volumes",
                &[("fields", "*"), ("svm.name", svm), ("name", name)],
            )
            .await?;
        Ok(volumes.into_iter().find(|v| v.name == name))
    }

    /// `POST /storage/volumes`. Waits for the creation job when ONTAP answers
    /// asynchronously, then resolves the new volume's UUID by name.
    pub async fn create_volume(
        &self,
        cancel: &CancellationToken,
        body: &Value,
    ) -> Result<Volume, ClientError> {
        let name = body["name"].as_str().unwrap_or_default().to_string();
        let svm = body["svm"]["name"].as_str().unwrap_or_default().to_string();

        let resp = self.post(cancel, "/storage/volumes", body).await?;
        if let Some(uuid) = resp.get("uuid").and_then(Value::as_str) {
            return Ok(Volume {
                uuid: uuid.to_string(),
                name,
                ..Default::default()
            });
        }

        if let Some(job) = resp.get("job") {
            let job: JobRef = decode(job.clone(), "/storage/volumes job")?;
            self.wait_for_job(cancel, &job.uuid).await?;
        }

        self.find_volume(cancel, &svm, &name)
            .await?
            .ok_or_else(|| ClientError::InvalidResponse(format!("volume '{name}' not found after creation")))
    }

    /// `PATCH /storage/volumes/{uuid}`
    pub async fn update_volume(
        &self,
        cancel: &CancellationToken,
        uuid: &str,
        body: &Value,
    ) -> Result<(), ClientError> {
        self.patch(cancel, &format!("/storage/volumes/{uuid}"), body)
            .await
            .map(drop)
    }

    /// `DELETE /storage/volumes/{uuid}`. ONTAP requires the volume to be offline.
    pub async fn delete_volume(&self, cancel: &CancellationToken, uuid: &str) -> Result<(), ClientError> {
        self.delete(cancel, &format!("/storage/volumes/{uuid}"))
            .await
            .map(drop)
    }

    /// Volume with only autosize and space fields.
    pub async fn volume_autosize(
        &self,
        cancel: &CancellationToken,
        uuid: &str,
    ) -> Result<Volume, ClientError> {
        self.get(
            cancel,
            &format!("/storage/volumes/{uuid}"),
            &[("fields", "name,autosize,size,space")],
        )
        .await
    }

    /// Volume with space and the latest performance sample.
    pub async fn volume_stats(&self, cancel: &CancellationToken, uuid: &str) -> Result<Volume, ClientError> {
        self.get(
            cancel,
            &format!("/storage/volumes/{uuid}"),
            &[("fields", "uuid,name,state,svm,size,space,metric")],
        )
        .await
    }

    /// `GET /storage/volumes/{uuid}/snapshots`
    pub async fn list_volume_snapshots(
        &self,
        cancel: &CancellationToken,
        volume_uuid: &str,
    ) -> Result<Vec<Snapshot>, ClientError> {
        self.records(
            cancel,
            &format!("/storage/volumes/{volume_uuid}/snapshots"),
            &[("fields", "*")],
        )
        .await
    }

    /// `GET /storage/volumes/{uuid}/snapshots/{snapshot}`
    pub async fn get_volume_snapshot(
        &self,
        cancel: &CancellationToken,
        volume_uuid: &str,
        snapshot_uuid: &str,
    ) -> Result<Snapshot, ClientError> {
        self.get(
            cancel,
            &format!("/storage/volumes/{volume_uuid}/snapshots/{snapshot_uuid}"),
            &[("fields", "*")],
        )
        .await
    }

    /// `DELETE /storage/volumes/{uuid}/snapshots/{snapshot}`
    pub async fn delete_volume_snapshot(
        &self,
        cancel: &CancellationToken,
        volume_uuid: &str,
        snapshot_uuid: &str,
    ) -> Result<(), ClientError> {
        self.delete(
            cancel,
            &format!("/storage/volumes/{volume_uuid}/snapshots/{snapshot_uuid}"),
        )
        .await
        .map(drop)
    }

    /// `GET /storage/snapshot-policies`
    pub async fn list_snapshot_policies(
        &self,
        cancel: &CancellationToken,
        svm: Option<&str>,
    ) -> Result<Vec<SnapshotPolicy>, ClientError> {
        let mut query = vec![("fields", "*")];
        if let Some(svm) = svm {
            query.push(("svm.name", svm));
        }
        self.records(cancel, "/storage/snapshot-policies", &query).await
    }

    /// `GET /storage/snapshot-policies/{uuid}`
    pub async fn get_snapshot_policy(
        &self,
        cancel: &CancellationToken,
        uuid: &str,
    ) -> Result<SnapshotPolicy, ClientError> {
        self.get(cancel, &format!("/storage/snapshot-policies/{uuid}"), &[("fields", "*")])
            .await
    }

    /// `POST /storage/snapshot-policies`
    pub async fn create_snapshot_policy(
        &self,
        cancel: &CancellationToken,
        body: &Value,
    ) -> Result<(), ClientError> {
        self.post(cancel, "/storage/snapshot-policies", body).await.map(drop)
    }

    /// `DELETE /storage/snapshot-policies/{uuid}`
    pub async fn delete_snapshot_policy(
        &self,
        cancel: &CancellationToken,
        uuid: &str,
    ) -> Result<(), ClientError> {
        self.delete(cancel, &format!("/storage/snapshot-policies/{uuid}"))
            .await
            .map(drop)
    }

    /// `GET /cluster/schedules`
    pub async fn list_schedules(&self, cancel: &CancellationToken) -> Result<Vec<Schedule>, ClientError> {
        self.records(
            cancel,
            "/cluster/schedules",
            &[("fields", "uuid,name,type,cron,interval")],
        )
        .await
    }

    /// Find a job schedule by exact name.
    pub async fn find_schedule(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<Option<Schedule>, ClientError> {
        let schedules: Vec<Schedule> = self
            .records(
                cancel,
                "/cluster/schedules",
                &[("fields", "uuid,name,type,cron,interval"), ("name", name)],
            )
            .await?;
        Ok(schedules.into_iter().find(|s| s.name == name))
    }

    /// `POST /cluster/schedules`
    pub async fn create_schedule(&self, cancel: &CancellationToken, body: &Value) -> Result<(), ClientError> {
        self.post(cancel, "/cluster/schedules", body).await.map(drop)
    }

    /// `PATCH /cluster/schedules/{uuid}`
    pub async fn update_schedule(
        &self,
        cancel: &CancellationToken,
        uuid: &str,
        body: &Value,
    ) -> Result<(), ClientError> {
        self.patch(cancel, &format!("/cluster/schedules/{uuid}"), body)
            .await
            .map(drop)
    }

    /// `DELETE /cluster/schedules/{uuid}`
    pub async fn delete_schedule(&self, cancel: &CancellationToken, uuid: &str) -> Result<(), ClientError> {
        self.delete(cancel, &format!("/cluster/schedules/{uuid}"))
            .await
            .map(drop)
    }

    /// `GET /storage/qos/policies`.
    ///
    /// With an SVM filter, cluster-scoped policies (no owning SVM) are merged in
    /// since every SVM can use them.
    pub async fn list_qos_policies(
        &self,
        cancel: &CancellationToken,
        svm: Option<&str>,
    ) -> Result<Vec<QosPolicy>, ClientError> {
        let Some(svm) = svm else {
            return self
                .records(cancel, "/storage/qos/policies", &[("fields", "*")])
                .await;
        };

        let mut policies: Vec<QosPolicy> = self
            .records(
                cancel,
                "/storage/qos/policies",
                &[("fields", "*"), ("svm.name", svm)],
            )
            .await?;

        match self
            .records::<QosPolicy>(cancel, "/storage/qos/policies", &[("fields", "*")])
            .await
        {
            Ok(all) => policies.extend(all.into_iter().filter(|p| p.svm.is_none())),
            Err(e) => debug!("cluster-scoped QoS policies unavailable: {e}"),
        }
        Ok(policies)
    }

    /// `POST /storage/qos/policies`
    pub async fn create_qos_policy(
        &self,
        cancel: &CancellationToken,
        body: &Value,
    ) -> Result<(), ClientError> {
        self.post(cancel, "/storage/qos/policies", body).await.map(drop)
    }

    /// `GET /storage/qos/policies/{uuid}`
    pub async fn get_qos_policy(&self, cancel: &CancellationToken, uuid: &str) -> Result<QosPolicy, ClientError> {
        self.get(cancel, &format!("/storage/qos/policies/{uuid}"), &[("fields", "*")])
            .await
    }

    /// `PATCH /storage/qos/policies/{uuid}`
    pub async fn update_qos_policy(
        &self,
        cancel: &CancellationToken,
        uuid: &str,
        body: &Value,
    ) -> Result<(), ClientError> {
        self.patch(cancel, &format!("/storage/qos/policies/{uuid}"), body)
            .await
            .map(drop)
    }

    /// `DELETE /storage/qos/policies/{uuid}`
    pub async fn delete_qos_policy(&self, cancel: &CancellationToken, uuid: &str) -> Result<(), ClientError> {
        self.delete(cancel, &format!("/storage/qos/policies/{uuid}"))
            .await
            .map(drop)
    }

    /// `GET /protocols/cifs/shares`
    pub async fn list_cifs_shares(
        &self,
        cancel: &CancellationToken,
        svm: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<CifsShare>, ClientError> {
        let mut query = vec![("fields", "*")];
        if let Some(svm) = svm {
            query.push(("svm.name", svm));
        }
        if let Some(name) = name {
            query.push(("name", name));
        }
        self.records(cancel, "/protocols/cifs/shares", &query).await
    }

    /// `POST /protocols/cifs/shares`
    pub async fn create_cifs_share(
        &self,
        cancel: &CancellationToken,
        body: &Value,
    ) -> Result<(), ClientError> {
        self.post(cancel, "/protocols/cifs/shares", body).await.map(drop)
    }

    /// Find a share by exact name within an SVM.
    pub async fn get_cifs_share(
        &self,
        cancel: &CancellationToken,
        svm: &str,
        name: &str,
    ) -> Result<Option<CifsShare>, ClientError> {
        let shares = self.list_cifs_shares(cancel, Some(svm), Some(name)).await?;
        Ok(shares.into_iter().find(|s| s.name == name))
    }

    /// Resource path of a share. Shares are keyed by SVM UUID, so the share is
    /// looked up first.
    async fn cifs_share_path(
        &self,
        cancel: &CancellationToken,
        svm: &str,
        name: &str,
    ) -> Result<String, ClientError> {
        let share = self
            .get_cifs_share(cancel, svm, name)
            .await?
            .ok_or_else(|| ClientError::NotFound {
                message: format!("CIFS share '{name}' not found on SVM '{svm}'"),
            })?;
        let svm_uuid = share.svm.map(|s| s.uuid).unwrap_or_default();
        if svm_uuid.is_empty() {
            return Err(ClientError::InvalidResponse(format!(
                "CIFS share '{name}' has no SVM UUID"
            )));
        }
        Ok(format!("/protocols/cifs/shares/{svm_uuid}/{name}"))
    }

    /// `PATCH /protocols/cifs/shares/{svm_uuid}/{name}`
    pub async fn update_cifs_share(
        &self,
        cancel: &CancellationToken,
        svm: &str,
        name: &str,
        body: &Value,
    ) -> Result<(), ClientError> {
        let path = self.cifs_share_path(cancel, svm, name).await?;
        self.patch(cancel, &path, body).await.map(drop)
    }

    /// `DELETE /protocols/cifs/shares/{svm_uuid}/{name}`
    pub async fn delete_cifs_share(
        &self,
        cancel: &CancellationToken,
        svm: &str,
        name: &str,
    ) -> Result<(), ClientError> {
        let path = self.cifs_share_path(cancel, svm, name).await?;
        self.delete(cancel, &path).await.map(drop)
    }

    /// `GET /protocols/nfs/export-policies`
    pub async fn list_export_policies(
        &self,
        cancel: &CancellationToken,
        svm: Option<&str>,
    ) -> Result<Vec<ExportPolicy>, ClientError> {
        let mut query = vec![("fields", "*")];
        if let Some(svm) = svm {
            query.push(("svm.name", svm));
        }
        self.records(cancel, "/protocols/nfs/export-policies", &query)
            .await
    }

    /// Find an export policy id by name within an SVM.
    pub async fn find_export_policy(
        &self,
        cancel: &CancellationToken,
        svm: &str,
        name: &str,
    ) -> Result<Option<ExportPolicy>, ClientError> {
        let policies = self.list_export_policies(cancel, Some(svm)).await?;
        Ok(policies.into_iter().find(|p| p.name == name))
    }

    /// `GET /protocols/nfs/export-policies/{id}`
    pub async fn get_export_policy(
        &self,
        cancel: &CancellationToken,
        policy_id: u64,
    ) -> Result<ExportPolicy, ClientError> {
        self.get(
            cancel,
            &format!("/protocols/nfs/export-policies/{policy_id}"),
            &[("fields", "*")],
        )
        .await
    }

    /// `POST /protocols/nfs/export-policies`
    pub async fn create_export_policy(
        &self,
        cancel: &CancellationToken,
        body: &Value,
    ) -> Result<Value, ClientError> {
        self.post(cancel, "/protocols/nfs/export-policies", body).await
    }

    /// `POST /protocols/nfs/export-policies/{id}/rules`
    pub async fn add_export_rule(
        &self,
        cancel: &CancellationToken,
        policy_id: u64,
        body: &Value,
    ) -> Result<(), ClientError> {
        self.post(
            cancel,
            &format!("/protocols/nfs/export-policies/{policy_id}/rules"),
            body,
        )
        .await
        .map(drop)
    }

    /// `PATCH /protocols/nfs/export-policies/{id}/rules/{index}`
    pub async fn update_export_rule(
        &self,
        cancel: &CancellationToken,
        policy_id: u64,
        index: u32,
        body: &Value,
    ) -> Result<(), ClientError> {
        self.patch(
            cancel,
            &format!("/protocols/nfs/export-policies/{policy_id}/rules/{index}"),
            body,
        )
        .await
        .map(drop)
    }

    /// `DELETE /protocols/nfs/export-policies/{id}/rules/{index}`
    pub async fn delete_export_rule(
        &self,
        cancel: &CancellationToken,
        policy_id: u64,
        index: u32,
    ) -> Result<(), ClientError> {
        self.delete(
            cancel,
            &format!("/protocols/nfs/export-policies/{policy_id}/rules/{index}"),
        )
        .await
        .map(drop)
    }

    /// `DELETE /protocols/nfs/export-policies/{id}`
    pub async fn delete_export_policy(
        &self,
        cancel: &CancellationToken,
        policy_id: u64,
    ) -> Result<(), ClientError> {
        self.delete(cancel, &format!("/protocols/nfs/export-policies/{policy_id}"))
            .await
            .map(drop)
    }

    /// Poll `GET /cluster/jobs/{uuid}` until the job succeeds or fails.
    ///
    /// Transient status-check failures are retried; cancellation ends the wait.
    pub async fn wait_for_job(&self, cancel: &CancellationToken, job_uuid: &str) -> Result<(), ClientError> {
        let path = format!("/cluster/jobs/{job_uuid}");
        for attempt in 1..=JOB_POLL_ATTEMPTS {
            tokio::select! {
                () = cancel.cancelled() => return Err(ClientError::Cancelled),
                () = tokio::time::sleep(JOB_POLL_INTERVAL) => {}
            }

            let status: JobStatus = match self.get(cancel, &path, &[("fields", "state,message")]).await {
                Ok(status) => status,
                Err(ClientError::Cancelled) => return Err(ClientError::Cancelled),
                Err(e) => {
                    debug!(job = job_uuid, attempt, "job status check failed: {e}");
                    continue;
                }
            };

            match status.state.as_str() {
                "success" => return Ok(()),
                "failure" => {
                    return Err(ClientError::Api {
                        status: 200,
                        message: format!("job {job_uuid} failed: {}", status.message),
                    })
                }
                _ => debug!(job = job_uuid, attempt, state = %status.state, "job still running"),
            }
        }
        Err(ClientError::Timeout(format!(
            "job {job_uuid} did not complete after {JOB_POLL_ATTEMPTS} checks"
        )))
    }

    async fn records<T: serde::de::DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, ClientError> {
        let page: Records<T> = self.get(cancel, path, query).await?;
        Ok(page.records)
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|e| ClientError::InvalidResponse(format!("{what}: {e}")))
}

/// Body for taking a volume offline before deletion.
pub fn offline_body() -> Value {
    json!({ "state": "offline" })
}
